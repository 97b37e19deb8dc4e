//! Shortest paths over a sentence's dependency graph.
//!
//! Arcs are read from each token's `dep_head` and treated as undirected, so a
//! path may climb to a common head and descend again.

use std::collections::VecDeque;

use crate::errors::{RelfeatError, RelfeatResult};
use crate::models::{token_at, Token};

/// Relation label used for arcs whose dependent carries no label.
pub const UNLABELED_ARC: &str = "dep";

/// Ordered tokens connecting two heads, plus the label of every hop.
#[derive(Debug, Clone, PartialEq)]
pub struct Path<'s> {
    tokens: Vec<&'s Token>,
    labels: Vec<&'s str>,
}

impl<'s> Path<'s> {
    pub fn tokens(&self) -> &[&'s Token] {
        &self.tokens
    }

    /// Hop labels; always one fewer than the tokens.
    pub fn labels(&self) -> &[&'s str] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn head(&self) -> Option<&'s Token> {
        self.tokens.first().copied()
    }

    pub fn tail(&self) -> Option<&'s Token> {
        self.tokens.last().copied()
    }
}

fn adjacency(sentence: &[Token]) -> Vec<Vec<(usize, &str)>> {
    let mut adjacency: Vec<Vec<(usize, &str)>> = vec![Vec::new(); sentence.len()];
    for token in sentence {
        let Some(head) = token.dep_head else {
            continue;
        };
        if head == token.id || head >= sentence.len() || token.id >= sentence.len() {
            continue;
        }
        let label = token.dep_label.as_deref().unwrap_or(UNLABELED_ARC);
        adjacency[token.id].push((head, label));
        adjacency[head].push((token.id, label));
    }
    for neighbours in &mut adjacency {
        neighbours.sort_by_key(|&(id, _)| id);
    }
    adjacency
}

/// Breadth-first shortest path between the tokens `from` and `to`.
///
/// Ties are broken towards lower token ids so the same sentence always yields
/// the same path.
pub fn compute_shortest_path<'s>(
    sentence: &'s [Token],
    from: usize,
    to: usize,
) -> RelfeatResult<Path<'s>> {
    let source = token_at(sentence, from)?;
    token_at(sentence, to)?;

    if from == to {
        return Ok(Path {
            tokens: vec![source],
            labels: Vec::new(),
        });
    }

    let adjacency = adjacency(sentence);
    let mut previous: Vec<Option<(usize, &'s str)>> = vec![None; sentence.len()];
    let mut visited = vec![false; sentence.len()];
    let mut queue = VecDeque::new();
    visited[from] = true;
    queue.push_back(from);

    while let Some(current) = queue.pop_front() {
        if current == to {
            break;
        }
        for &(next, label) in &adjacency[current] {
            if visited[next] {
                continue;
            }
            visited[next] = true;
            previous[next] = Some((current, label));
            queue.push_back(next);
        }
    }

    if !visited[to] {
        return Err(RelfeatError::NoDependencyPath { from, to });
    }

    let mut tokens = vec![&sentence[to]];
    let mut labels = Vec::new();
    let mut current = to;
    while let Some((prev, label)) = previous[current] {
        tokens.push(&sentence[prev]);
        labels.push(label);
        current = prev;
    }
    tokens.reverse();
    labels.reverse();

    Ok(Path { tokens, labels })
}
