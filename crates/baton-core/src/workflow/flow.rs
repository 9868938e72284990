//! Flow graph: the directed graph of agent hand-offs.
//!
//! Parsed once per run from the goal document's `flow` field:
//!
//! ```text
//! # comments start with '#' or '//'
//! "coordinator" -> "architect" -> developer
//! developer -> reviewer, tester      # fan-out, declaration order is kept
//! reviewer -> coordinator; tester    # ';' separates statements
//! ```
//!
//! Every node of a group gets an edge to every node of the following group.
//! The graph is immutable after parsing.

use std::collections::HashSet;

use crate::error::BatonError;

/// The root agent. It is always part of the graph and is the only agent
/// allowed to declare the workflow complete.
pub const COORDINATOR: &str = "coordinator";

/// Parse error with the 1-based line it occurred on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct FlowError {
    pub line: usize,
    pub message: String,
}

impl From<FlowError> for BatonError {
    fn from(e: FlowError) -> Self {
        BatonError::MalformedSpec {
            line: e.line,
            message: e.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Arrow,
    Comma,
    Separator,
}

/// Immutable directed graph of agent names.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    /// Declared nodes, in first-appearance order
    nodes: Vec<String>,
    /// Directed edges, in declaration order, without duplicates
    edges: Vec<(String, String)>,
}

impl FlowGraph {
    /// Parse the edge-list language.
    pub fn parse(spec: &str) -> Result<Self, FlowError> {
        let mut graph = FlowGraph::default();

        for (idx, raw_line) in spec.lines().enumerate() {
            let line_no = idx + 1;
            let tokens = tokenize(raw_line, line_no)?;

            for statement in tokens.split(|t| *t == Token::Separator) {
                if statement.is_empty() {
                    continue;
                }
                let groups = parse_statement(statement, line_no)?;
                graph.add_groups(&groups, line_no)?;
            }
        }

        Ok(graph)
    }

    fn add_node(&mut self, name: &str) {
        if !self.nodes.iter().any(|n| n == name) {
            self.nodes.push(name.to_string());
        }
    }

    fn add_groups(&mut self, groups: &[Vec<String>], line: usize) -> Result<(), FlowError> {
        for group in groups {
            for name in group {
                self.add_node(name);
            }
        }

        for pair in groups.windows(2) {
            for from in &pair[0] {
                for to in &pair[1] {
                    if from == to {
                        return Err(FlowError {
                            line,
                            message: format!("self-loop on '{}' is not allowed", from),
                        });
                    }
                    let edge = (from.clone(), to.clone());
                    if !self.edges.contains(&edge) {
                        self.edges.push(edge);
                    }
                }
            }
        }

        Ok(())
    }

    /// Every agent the graph knows about, including the implicit coordinator.
    pub fn all_agents(&self) -> Vec<String> {
        let mut agents = self.nodes.clone();
        if !agents.iter().any(|a| a == COORDINATOR) {
            agents.push(COORDINATOR.to_string());
        }
        agents
    }

    /// Whether `agent` is declared or is the implicit coordinator.
    pub fn contains(&self, agent: &str) -> bool {
        agent == COORDINATOR || self.nodes.iter().any(|n| n == agent)
    }

    /// Nodes with no declared predecessor, in declaration order. The
    /// coordinator is appended when it was never declared.
    pub fn entry_nodes(&self) -> Vec<String> {
        let targets: HashSet<&str> = self.edges.iter().map(|(_, to)| to.as_str()).collect();
        let mut entries: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| !targets.contains(n.as_str()))
            .cloned()
            .collect();
        if !self.nodes.iter().any(|n| n == COORDINATOR) {
            entries.push(COORDINATOR.to_string());
        }
        entries
    }

    /// Where a fresh run starts: the coordinator when it is an entry node,
    /// otherwise the first entry node.
    pub fn start_node(&self) -> String {
        let entries = self.entry_nodes();
        if entries.iter().any(|e| e == COORDINATOR) {
            return COORDINATOR.to_string();
        }
        entries
            .into_iter()
            .next()
            .unwrap_or_else(|| COORDINATOR.to_string())
    }

    /// True iff the node has no outgoing edges.
    pub fn is_terminal(&self, agent: &str) -> bool {
        !self.edges.iter().any(|(from, _)| from == agent)
    }

    /// Outgoing neighbours in declaration order.
    pub fn successors(&self, agent: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(from, _)| from == agent)
            .map(|(_, to)| to.as_str())
            .collect()
    }

    /// Incoming neighbours in declaration order.
    pub fn predecessors(&self, agent: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, to)| to == agent)
            .map(|(from, _)| from.as_str())
            .collect()
    }

    /// Single-successor transition: the first declared outgoing edge.
    pub fn next(&self, current: &str) -> Option<&str> {
        self.successors(current).into_iter().next()
    }

    /// Edges in declaration order.
    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    /// Render the declared topology as Graphviz DOT.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph flow {\n    rankdir=LR;\n");
        for node in self.all_agents() {
            let shape = if node == COORDINATOR { "doublecircle" } else { "box" };
            out.push_str(&format!("    \"{}\" [shape={}];\n", escape_dot(&node), shape));
        }
        for (from, to) in &self.edges {
            out.push_str(&format!(
                "    \"{}\" -> \"{}\";\n",
                escape_dot(from),
                escape_dot(to)
            ));
        }
        out.push_str("}\n");
        out
    }

    /// Follow `next` from `start` until a terminal node or a revisit.
    /// Returns the visited path, ending with the terminal or repeated node.
    pub fn walk(&self, start: &str) -> Vec<String> {
        let mut path = vec![start.to_string()];
        let mut seen: HashSet<String> = HashSet::from([start.to_string()]);
        let mut current = start.to_string();

        while let Some(next) = self.next(&current) {
            path.push(next.to_string());
            if !seen.insert(next.to_string()) {
                break;
            }
            current = next.to_string();
        }
        path
    }
}

fn escape_dot(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn tokenize(line: &str, line_no: usize) -> Result<Vec<Token>, FlowError> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let at_arrow = |i: usize| chars.get(i) == Some(&'-') && chars.get(i + 1) == Some(&'>');

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '#' => break,
            '/' if chars.get(i + 1) == Some(&'/') => break,
            ';' => {
                tokens.push(Token::Separator);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '-' if at_arrow(i) => {
                tokens.push(Token::Arrow);
                i += 2;
            }
            '"' => {
                let rest: String = chars[i + 1..].iter().collect();
                let Some(close) = rest.find('"') else {
                    return Err(FlowError {
                        line: line_no,
                        message: "unterminated quoted agent name".to_string(),
                    });
                };
                let name = rest[..close].trim().to_string();
                if name.is_empty() {
                    return Err(FlowError {
                        line: line_no,
                        message: "empty agent name".to_string(),
                    });
                }
                i += 1 + rest[..close].chars().count() + 1;
                tokens.push(Token::Name(name));
            }
            c if is_name_char(c) => {
                let mut name = String::new();
                // a '-' directly followed by '>' ends the name: `a->b`
                while i < chars.len() && is_name_char(chars[i]) && !at_arrow(i) {
                    name.push(chars[i]);
                    i += 1;
                }
                tokens.push(Token::Name(name));
            }
            other => {
                return Err(FlowError {
                    line: line_no,
                    message: format!("unexpected character '{}'", other),
                });
            }
        }
    }

    Ok(tokens)
}

fn parse_statement(tokens: &[Token], line_no: usize) -> Result<Vec<Vec<String>>, FlowError> {
    let err = |message: &str| FlowError {
        line: line_no,
        message: message.to_string(),
    };

    let mut groups: Vec<Vec<String>> = vec![Vec::new()];
    let mut expect_name = true;

    for token in tokens {
        match token {
            Token::Name(name) => {
                if !expect_name {
                    return Err(err(&format!(
                        "expected '->' or ',' before '{}'",
                        name
                    )));
                }
                if let Some(group) = groups.last_mut() {
                    group.push(name.clone());
                }
                expect_name = false;
            }
            Token::Comma => {
                if expect_name {
                    return Err(err("expected agent name before ','"));
                }
                expect_name = true;
            }
            Token::Arrow => {
                if expect_name {
                    return Err(err("expected agent name before '->'"));
                }
                groups.push(Vec::new());
                expect_name = true;
            }
            Token::Separator => return Err(err("unexpected ';' inside a statement")),
        }
    }

    if expect_name {
        return Err(err("statement ends without an agent name"));
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_chain() {
        let graph = FlowGraph::parse(r#""coordinator" -> "developer""#).unwrap();
        assert_eq!(graph.all_agents(), vec!["coordinator", "developer"]);
        assert_eq!(graph.entry_nodes(), vec!["coordinator"]);
        assert_eq!(graph.next("coordinator"), Some("developer"));
        assert!(graph.is_terminal("developer"));
        assert!(!graph.is_terminal("coordinator"));
        assert_eq!(graph.start_node(), "coordinator");
    }

    #[test]
    fn test_fan_out_picks_first_declared_edge() {
        let spec = r#"
# review loop
coordinator -> developer
developer -> reviewer, tester   // fan-out
reviewer -> coordinator; tester
"#;
        let graph = FlowGraph::parse(spec).unwrap();
        assert_eq!(graph.successors("developer"), vec!["reviewer", "tester"]);
        assert_eq!(graph.next("developer"), Some("reviewer"));
        assert!(graph.is_terminal("tester"));
        assert_eq!(graph.predecessors("coordinator"), vec!["reviewer"]);
        // coordinator has a predecessor, so there are no declared entry nodes
        assert!(graph.entry_nodes().is_empty());
    }

    #[test]
    fn test_implicit_coordinator_entry() {
        let graph = FlowGraph::parse("planner -> developer").unwrap();
        assert_eq!(graph.entry_nodes(), vec!["planner", "coordinator"]);
        assert!(graph.contains("coordinator"));
        assert!(graph.all_agents().contains(&"coordinator".to_string()));
        assert_eq!(graph.start_node(), "coordinator");

        let empty = FlowGraph::parse("").unwrap();
        assert_eq!(empty.all_agents(), vec!["coordinator"]);
        assert!(empty.is_terminal("coordinator"));
    }

    #[test]
    fn test_duplicate_edges_are_ignored() {
        let graph = FlowGraph::parse("a -> b\na->b\na -> c").unwrap();
        assert_eq!(graph.edges().len(), 2);
        assert_eq!(graph.next("a"), Some("b"));
    }

    #[test]
    fn test_malformed_specs() {
        let cases = [
            ("a -> ", 1),
            ("a ->\n-> b", 1),
            ("a\n\"b -> c", 2),
            ("a -> a", 1),
            ("a b", 1),
            ("a -> , b", 1),
            ("a -> b\nc => d", 2),
            ("\"\" -> b", 1),
        ];
        for (spec, line) in cases {
            let err = FlowGraph::parse(spec).unwrap_err();
            assert_eq!(err.line, line, "spec {:?} -> {}", spec, err);
        }
    }

    #[test]
    fn test_walk_reaches_terminal_or_revisit() {
        let graph = FlowGraph::parse(
            "coordinator -> architect -> developer -> reviewer -> coordinator\nreviewer -> docs",
        )
        .unwrap();
        for agent in graph.all_agents() {
            let path = graph.walk(&agent);
            let last = path.last().unwrap();
            let revisited = path[..path.len() - 1].contains(last);
            assert!(graph.is_terminal(last) || revisited, "path {:?}", path);
            if revisited {
                assert!(path.iter().any(|a| a == COORDINATOR));
            }
        }
    }

    #[test]
    fn test_dot_rendering() {
        let graph = FlowGraph::parse(r#"coordinator -> "dev ops""#).unwrap();
        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph flow {"));
        assert!(dot.contains("\"coordinator\" -> \"dev ops\";"));
        assert!(dot.contains("\"coordinator\" [shape=doublecircle];"));
    }
}
