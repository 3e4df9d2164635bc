//! Minimal internal circuit graph: entities plus the node/branch variable
//! map. Netlist parsing and reflection-based parameter binding are out of
//! scope; callers build this structure programmatically (or a parser layered
//! on top of this crate does).

use std::collections::HashMap;

/// A typed parameter bag. Devices read the values they need by key; an
/// external reflection-based binder (out of scope here) is what would
/// populate this from netlist text.
#[derive(Clone, Debug, Default)]
pub struct ParameterSet {
    values: HashMap<String, f64>,
    /// Non-numeric parameters: currently only a controlled source's
    /// reference to the name of the voltage source whose branch current
    /// controls it (SPICE's `Fname N+ N- VNAME value` / `Hname ... VNAME
    /// value` syntax addresses a source by name, not by node).
    strings: HashMap<String, String>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn with_str(mut self, name: &str, value: &str) -> Self {
        self.strings.insert(name.to_string(), value.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn get_or(&self, name: &str, default: f64) -> f64 {
        self.values.get(name).copied().unwrap_or(default)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.strings.get(name).map(|s| s.as_str())
    }
}

/// A named circuit entity: its terminal node names (in device-defined order)
/// and its parameters. `"0"` denotes ground by convention.
#[derive(Clone, Debug)]
pub struct Entity {
    pub name: String,
    pub nodes: Vec<String>,
    pub params: ParameterSet,
}

impl Entity {
    pub fn new(name: impl Into<String>, nodes: &[&str], params: ParameterSet) -> Self {
        Self {
            name: name.into(),
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            params,
        }
    }
}

pub const GROUND: usize = 0;

/// Interns node names to 1-based MNA indices and hands out extra branch
/// indices to devices that need an internal current unknown (voltage
/// sources, inductors, ...). Grounded on `spicy_parser::node_mapping::NodeMapping`,
/// reimplemented locally since the parser crate is out of scope.
#[derive(Clone, Debug, Default)]
pub struct NodeMap {
    nodes: HashMap<String, usize>,
    node_names: Vec<String>,
    branch_counter: usize,
}

impl NodeMap {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            node_names: vec!["0".to_string()],
            branch_counter: 0,
        }
    }

    /// Interns `name`, returning its MNA index. `"0"`/`"gnd"` always map to 0.
    pub fn insert_node(&mut self, name: &str) -> usize {
        if name == "0" || name.eq_ignore_ascii_case("gnd") {
            return GROUND;
        }
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.node_names.len();
        self.node_names.push(name.to_string());
        self.nodes.insert(name.to_string(), idx);
        idx
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        if name == "0" || name.eq_ignore_ascii_case("gnd") {
            return Some(GROUND);
        }
        self.nodes.get(name).copied()
    }

    /// Allocates a fresh branch-current unknown, numbered after all node
    /// indices so node and branch unknowns share one contiguous MNA index
    /// space (`1..=nodes_len()` then `nodes_len()+1..`).
    pub fn insert_branch(&mut self) -> usize {
        self.branch_counter += 1;
        self.nodes_len() + self.branch_counter
    }

    /// Number of non-ground nodes (ground is never counted or stored).
    pub fn nodes_len(&self) -> usize {
        self.node_names.len() - 1
    }

    pub fn branches_len(&self) -> usize {
        self.branch_counter
    }

    /// Total unknown count: the matrix order.
    pub fn mna_matrix_dim(&self) -> usize {
        self.nodes_len() + self.branches_len()
    }

    pub fn node_names_mna_order(&self) -> &[String] {
        &self.node_names[1..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_always_zero() {
        let mut m = NodeMap::new();
        assert_eq!(m.insert_node("0"), GROUND);
        assert_eq!(m.insert_node("gnd"), GROUND);
        assert_eq!(m.insert_node("GND"), GROUND);
        let _ = m.insert_node("in");
    }

    #[test]
    fn node_interning_is_stable() {
        let mut m = NodeMap::new();
        let a = m.insert_node("in");
        let b = m.insert_node("out");
        let a2 = m.insert_node("in");
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(m.nodes_len(), 2);
    }

    #[test]
    fn branches_stack_after_nodes() {
        let mut m = NodeMap::new();
        m.insert_node("in");
        m.insert_node("out");
        let b1 = m.insert_branch();
        let b2 = m.insert_branch();
        assert_eq!(b1, 3);
        assert_eq!(b2, 4);
        assert_eq!(m.mna_matrix_dim(), 4);
    }
}
