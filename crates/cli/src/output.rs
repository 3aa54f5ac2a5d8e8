#![forbid(unsafe_code)]

use mptt_core::{IntegrityReport, Node, RebuildReport};
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Serialize)]
pub struct NodeView {
    pub id: String,
    pub parent: Option<String>,
    pub is_group: bool,
    pub lft: Option<i64>,
    pub rgt: Option<i64>,
}

impl From<&Node> for NodeView {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.to_string(),
            parent: node.parent.as_ref().map(ToString::to_string),
            is_group: node.is_group,
            lft: node.bounds.map(|b| b.lft()),
            rgt: node.bounds.map(|b| b.rgt()),
        }
    }
}

impl NodeView {
    fn line(&self) -> String {
        let range = match (self.lft, self.rgt) {
            (Some(lft), Some(rgt)) => format!("({lft}, {rgt})"),
            _ => "(unplaced)".to_string(),
        };
        let kind = if self.is_group { "group" } else { "leaf" };
        let parent = self.parent.as_deref().unwrap_or("-");
        format!("{}\t{range}\t{kind}\tparent={parent}", self.id)
    }
}

/// Plain text or JSON, chosen once per invocation.
#[derive(Clone, Copy, Debug)]
pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn nodes(&self, nodes: &[Node]) {
        let views: Vec<NodeView> = nodes.iter().map(NodeView::from).collect();
        if self.json {
            self.emit(json!({ "nodes": views }));
            return;
        }
        for view in &views {
            println!("{}", view.line());
        }
    }

    pub fn node(&self, node: Option<&Node>) {
        let view = node.map(NodeView::from);
        if self.json {
            self.emit(json!({ "node": view }));
            return;
        }
        match view {
            Some(view) => println!("{}", view.line()),
            None => println!("(none)"),
        }
    }

    pub fn message(&self, action: &str, detail: Value) {
        if self.json {
            self.emit(json!({ "ok": true, "action": action, "detail": detail }));
            return;
        }
        match detail {
            Value::Null => println!("{action}"),
            Value::String(text) => println!("{action}: {text}"),
            other => println!("{action}: {other}"),
        }
    }

    pub fn rebuild(&self, tree_type: &str, report: &RebuildReport) {
        if self.json {
            self.emit(json!({
                "tree": tree_type,
                "roots": report.roots,
                "nodes": report.nodes,
                "commits": report.commits,
            }));
            return;
        }
        println!(
            "rebuilt {tree_type}: {} nodes under {} roots in {} commits",
            report.nodes, report.roots, report.commits
        );
    }

    pub fn integrity(&self, tree_type: &str, report: &IntegrityReport) {
        let violations: Vec<String> = report.violations.iter().map(ToString::to_string).collect();
        if self.json {
            self.emit(json!({
                "tree": tree_type,
                "nodes": report.nodes,
                "ok": report.is_ok(),
                "violations": violations,
            }));
            return;
        }
        if report.is_ok() {
            println!("{tree_type}: {} nodes, ranges consistent", report.nodes);
            return;
        }
        println!(
            "{tree_type}: {} nodes, {} violations",
            report.nodes,
            violations.len()
        );
        for violation in &violations {
            println!("  {violation}");
        }
    }

    fn emit(&self, value: Value) {
        println!("{value}");
    }
}
