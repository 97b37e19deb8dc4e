//! Corpus models consumed by the feature generators and the solver bridge.
//!
//! Tokens carry the attributes produced by an upstream parser (`lemma`, `pos`,
//! `is_punct`, `id` and the dependency head/label).  A token's `id` is its
//! position in the sentence, so `sentence[token.id]` is the token itself.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{RelfeatError, RelfeatResult};

/// Target value of a positive (related) edge.
pub const POSITIVE_LABEL: i32 = 1;

/// Target value of a negative (unrelated) edge.
pub const NEGATIVE_LABEL: i32 = -1;

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: usize,
    pub word: String,
    pub lemma: String,
    pub pos: String,
    #[serde(default)]
    pub is_punct: bool,
    /// Id of the syntactic head, `None` for the sentence root.
    #[serde(default)]
    pub dep_head: Option<usize>,
    /// Relation label of the arc from `dep_head` to this token.
    #[serde(default)]
    pub dep_label: Option<String>,
}

impl Token {
    pub fn new(id: usize, word: &str, lemma: &str, pos: &str) -> Self {
        Self {
            id,
            word: word.to_string(),
            lemma: lemma.to_string(),
            pos: pos.to_string(),
            is_punct: false,
            dep_head: None,
            dep_label: None,
        }
    }

    pub fn punct(mut self) -> Self {
        self.is_punct = true;
        self
    }

    pub fn with_dependency(mut self, head: usize, label: &str) -> Self {
        self.dep_head = Some(head);
        self.dep_label = Some(label.to_string());
        self
    }
}

pub type Sentence = Vec<Token>;

/// Check that every token's id is its position in the sentence.
pub fn check_token_ids(sentence: &[Token]) -> RelfeatResult<()> {
    match sentence
        .iter()
        .enumerate()
        .find(|(position, token)| token.id != *position)
    {
        Some((position, token)) => Err(RelfeatError::MisalignedToken {
            position,
            token_id: token.id,
        }),
        None => Ok(()),
    }
}

/// Look up a token by id, failing when the id is past the sentence end.
pub fn token_at(sentence: &[Token], token_id: usize) -> RelfeatResult<&Token> {
    sentence.get(token_id).ok_or(RelfeatError::TokenNotFound {
        token_id,
        sentence_len: sentence.len(),
    })
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// An annotated mention spanning a contiguous run of tokens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub class_id: String,
    pub text: String,
    /// Character offset of the mention inside its part.
    pub offset: usize,
    /// Ordered ids of the tokens covered by the mention.
    pub tokens: Vec<usize>,
    /// Id of the syntactic head of the span.
    pub head_token: usize,
}

impl Entity {
    pub fn new(
        class_id: &str,
        text: &str,
        offset: usize,
        tokens: Vec<usize>,
        head_token: usize,
    ) -> Self {
        Self {
            class_id: class_id.to_string(),
            text: text.to_string(),
            offset,
            tokens,
            head_token,
        }
    }

    pub fn first_token(&self) -> Option<usize> {
        self.tokens.first().copied()
    }

    pub fn last_token(&self) -> Option<usize> {
        self.tokens.last().copied()
    }

    /// Up to `n` tokens preceding the entity, nearest first.
    pub fn prev_tokens<'s>(&self, sentence: &'s [Token], n: usize) -> Vec<&'s Token> {
        let Some(first) = self.first_token() else {
            return Vec::new();
        };
        let first = first.min(sentence.len());
        sentence[..first].iter().rev().take(n).collect()
    }

    /// Up to `n` tokens following the entity, nearest first.
    pub fn next_tokens<'s>(&self, sentence: &'s [Token], n: usize) -> Vec<&'s Token> {
        let Some(last) = self.last_token() else {
            return Vec::new();
        };
        let start = (last + 1).min(sentence.len());
        sentence[start..].iter().take(n).collect()
    }
}

// ---------------------------------------------------------------------------
// Edge / Relation
// ---------------------------------------------------------------------------

/// A candidate relation between two entities of the same sentence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub entity1: Entity,
    pub entity2: Entity,
    pub relation_type: String,
    pub sentence_id: usize,
    /// Gold label during training, predicted label after read-back.
    #[serde(default = "default_target")]
    pub target: i32,
    /// Feature index -> value, filled by the feature generators.
    #[serde(default)]
    pub features: BTreeMap<usize, f64>,
}

fn default_target() -> i32 {
    NEGATIVE_LABEL
}

/// Whether `target` is one of the two class labels.
pub fn is_class_label(target: i32) -> bool {
    target == POSITIVE_LABEL || target == NEGATIVE_LABEL
}

impl Edge {
    /// Build an edge, ordering the entities by text offset.
    pub fn new(a: Entity, b: Entity, relation_type: &str, sentence_id: usize) -> Self {
        let (entity1, entity2) = if b.offset < a.offset { (b, a) } else { (a, b) };
        Self {
            entity1,
            entity2,
            relation_type: relation_type.to_string(),
            sentence_id,
            target: NEGATIVE_LABEL,
            features: BTreeMap::new(),
        }
    }

    pub fn with_target(mut self, target: i32) -> Self {
        self.target = target;
        self
    }
}

/// A relation materialized from a positively classified edge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub relation_type: String,
    pub entity1: Entity,
    pub entity2: Entity,
}

// ---------------------------------------------------------------------------
// Part / Document / Dataset
// ---------------------------------------------------------------------------

/// A sentence-bearing unit of a document (a title, an abstract, ...).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
    /// Bracketed constituency tree per sentence, used by the tree kernel.
    #[serde(default)]
    pub sentence_parse_trees: Vec<String>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub predicted_relations: Vec<Relation>,
}

impl Part {
    pub fn sentence(&self, sentence_id: usize) -> Option<&[Token]> {
        self.sentences.get(sentence_id).map(Vec::as_slice)
    }

    pub fn parse_tree(&self, sentence_id: usize) -> Option<&str> {
        self.sentence_parse_trees.get(sentence_id).map(String::as_str)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub parts: IndexMap<String, Part>,
}

/// An edge seen together with the part that owns it.
#[derive(Clone, Copy, Debug)]
pub struct EdgeContext<'a> {
    pub part_id: &'a str,
    pub part: &'a Part,
    pub edge: &'a Edge,
}

impl<'a> EdgeContext<'a> {
    /// The sentence holding both entities of the edge.
    pub fn combined_sentence(&self) -> RelfeatResult<&'a [Token]> {
        self.part
            .sentence(self.edge.sentence_id)
            .ok_or_else(|| RelfeatError::MissingSentence {
                part_id: self.part_id.to_string(),
                sentence_id: self.edge.sentence_id,
            })
    }

    pub fn parse_tree(&self) -> RelfeatResult<&'a str> {
        self.part
            .parse_tree(self.edge.sentence_id)
            .ok_or_else(|| RelfeatError::MissingParseTree {
                part_id: self.part_id.to_string(),
                sentence_id: self.edge.sentence_id,
            })
    }
}

/// Insertion-ordered collection of documents.
///
/// Every edge iterator walks documents, then parts, then edges in insertion
/// order; the solver bridge relies on this order being the same on every call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub documents: IndexMap<String, Document>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> RelfeatResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> RelfeatResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parts(&self) -> impl Iterator<Item = (&str, &Part)> {
        self.documents
            .values()
            .flat_map(|doc| doc.parts.iter().map(|(id, part)| (id.as_str(), part)))
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.parts().flat_map(|(_, part)| part.edges.iter())
    }

    pub fn edges_mut(&mut self) -> impl Iterator<Item = &mut Edge> {
        self.documents
            .values_mut()
            .flat_map(|doc| doc.parts.values_mut())
            .flat_map(|part| part.edges.iter_mut())
    }

    pub fn edge_contexts(&self) -> impl Iterator<Item = EdgeContext<'_>> {
        self.parts().flat_map(|(part_id, part)| {
            part.edges.iter().map(move |edge| EdgeContext { part_id, part, edge })
        })
    }

    pub fn edge_count(&self) -> usize {
        self.parts().map(|(_, part)| part.edges.len()).sum()
    }

    /// Rebuild each part's predicted relations from its positively labelled edges.
    pub fn form_predicted_relations(&mut self) {
        for part in self.documents.values_mut().flat_map(|doc| doc.parts.values_mut()) {
            part.predicted_relations = part
                .edges
                .iter()
                .filter(|edge| edge.target == POSITIVE_LABEL)
                .map(|edge| Relation {
                    relation_type: edge.relation_type.clone(),
                    entity1: edge.entity1.clone(),
                    entity2: edge.entity2.clone(),
                })
                .collect();
        }
    }

    pub fn predicted_relations(&self) -> impl Iterator<Item = &Relation> {
        self.parts().flat_map(|(_, part)| part.predicted_relations.iter())
    }
}
