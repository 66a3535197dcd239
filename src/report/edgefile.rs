//! Edge-file parsing.
//!
//! The edge file is the build-to-report side channel describing every
//! method's edge set: one `method <id>` header per method, then one line per
//! edge in creation order, marked `I` (carries a counter) or `N` (tree edge,
//! reconstructed offline), optionally tagged with the global branch index.
//! Parsing is strict: reconstruction correctness depends on an exact match
//! with the instrumented program, so any malformed line is an error with its
//! line number rather than a best-effort skip.

use crate::{cfg::MethodId, Error, Result};

/// A node reference as written in an edge description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// The virtual method entry.
    Entry,
    /// The virtual method exit.
    Exit,
    /// A real statement node.
    Node(usize),
}

/// One parsed edge line.
#[derive(Debug, Clone)]
pub struct EdgeRecord {
    /// Global branch index, if the edge originates at a branch.
    pub branch: Option<u32>,
    /// `true` if the edge carries a runtime counter.
    pub instrumented: bool,
    /// Edge source.
    pub source: NodeRef,
    /// Edge target.
    pub target: NodeRef,
}

/// One method's section of the edge file.
#[derive(Debug, Clone)]
pub struct MethodEdges {
    /// The method the edges belong to.
    pub method: MethodId,
    /// Edges in creation order.
    pub edges: Vec<EdgeRecord>,
}

fn parse_error(message: impl Into<String>, line: usize) -> Error {
    Error::Parse {
        message: message.into(),
        line,
    }
}

fn parse_node(text: &str, line: usize) -> Result<NodeRef> {
    match text {
        "ENTRY" => Ok(NodeRef::Entry),
        "EXIT" => Ok(NodeRef::Exit),
        other => other
            .parse::<usize>()
            .map(NodeRef::Node)
            .map_err(|_| parse_error(format!("bad node reference '{other}'"), line)),
    }
}

/// Parses a complete edge file.
///
/// # Errors
///
/// Returns [`Error::Parse`] with the offending line number on any malformed
/// header, tag, mark, or edge description, or if an edge line precedes the
/// first method header.
pub fn parse_edge_file(text: &str) -> Result<Vec<MethodEdges>> {
    let mut methods: Vec<MethodEdges> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(id) = trimmed.strip_prefix("method ") {
            let id = id
                .trim()
                .parse::<u32>()
                .map_err(|_| parse_error(format!("bad method id '{id}'"), line))?;
            methods.push(MethodEdges {
                method: MethodId(id),
                edges: Vec::new(),
            });
            continue;
        }

        let Some(current) = methods.last_mut() else {
            return Err(parse_error("edge line before any method header", line));
        };

        let mut rest = trimmed;
        let branch = if let Some(tagged) = rest.strip_prefix("B ") {
            let (id, tail) = tagged
                .split_once(' ')
                .ok_or_else(|| parse_error("branch tag without edge", line))?;
            rest = tail;
            Some(
                id.parse::<u32>()
                    .map_err(|_| parse_error(format!("bad branch index '{id}'"), line))?,
            )
        } else {
            None
        };

        let (mark, desc) = rest
            .split_once(' ')
            .ok_or_else(|| parse_error("missing edge description", line))?;
        let instrumented = match mark {
            "I" => true,
            "N" => false,
            other => return Err(parse_error(format!("bad edge mark '{other}'"), line)),
        };

        let (src, tgt) = desc
            .split_once("->")
            .ok_or_else(|| parse_error(format!("bad edge description '{desc}'"), line))?;
        current.edges.push(EdgeRecord {
            branch,
            instrumented,
            source: parse_node(src, line)?,
            target: parse_node(tgt, line)?,
        });
    }

    Ok(methods)
}
