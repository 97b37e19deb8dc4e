//! Shared corpus fixtures for unit tests.
//!
//! The sample sentence is
//! `Recent studies show that p53 binds directly to MDM2 in human cells .`
//! with `p53` (token 4) and `MDM2` (token 8) as the entity pair.  Its
//! dependency path runs p53 -nsubj- binds -prep- to -pobj- MDM2.

use indexmap::IndexMap;

use crate::models::{Dataset, Document, Edge, Entity, Part, Sentence, Token};

pub const SAMPLE_TREE: &str = "(ROOT (S (NP (JJ Recent) (NNS studies)) (VP (VBP show) \
     (SBAR (IN that) (S (NP (NN p53)) (VP (VBZ binds) (ADVP (RB directly)) \
     (PP (TO to) (NP (NN MDM2))) (PP (IN in) (NP (JJ human) (NNS cells))))))) (. .)))";

pub fn sample_sentence() -> Sentence {
    vec![
        Token::new(0, "Recent", "recent", "JJ").with_dependency(1, "amod"),
        Token::new(1, "studies", "study", "NNS").with_dependency(2, "nsubj"),
        Token::new(2, "show", "show", "VBP"),
        Token::new(3, "that", "that", "IN").with_dependency(5, "mark"),
        Token::new(4, "p53", "p53", "NN").with_dependency(5, "nsubj"),
        Token::new(5, "binds", "bind", "VBZ").with_dependency(2, "ccomp"),
        Token::new(6, "directly", "directly", "RB").with_dependency(5, "advmod"),
        Token::new(7, "to", "to", "TO").with_dependency(5, "prep"),
        Token::new(8, "MDM2", "mdm2", "NN").with_dependency(7, "pobj"),
        Token::new(9, "in", "in", "IN").with_dependency(5, "prep"),
        Token::new(10, "human", "human", "JJ").with_dependency(11, "amod"),
        Token::new(11, "cells", "cell", "NNS").with_dependency(9, "pobj"),
        Token::new(12, ".", ".", ".").punct().with_dependency(2, "punct"),
    ]
}

/// The sample sentence with `binds` detached from the rest of the tree, so
/// `p53` and `MDM2` still connect but `studies` cannot reach them.
pub fn disconnected_sentence() -> Sentence {
    let mut sentence = sample_sentence();
    sentence[5].dep_head = None;
    sentence[5].dep_label = None;
    sentence
}

pub fn sample_edge() -> Edge {
    Edge::new(
        Entity::new("e_1", "p53", 25, vec![4], 4),
        Entity::new("e_2", "MDM2", 47, vec![8], 8),
        "r_1",
        0,
    )
}

/// A one-document dataset whose single part holds one sample edge per target.
pub fn sample_dataset(targets: &[i32]) -> Dataset {
    let part = Part {
        text: "Recent studies show that p53 binds directly to MDM2 in human cells .".to_string(),
        sentences: vec![sample_sentence()],
        sentence_parse_trees: vec![SAMPLE_TREE.to_string()],
        edges: targets
            .iter()
            .map(|&target| sample_edge().with_target(target))
            .collect(),
        predicted_relations: Vec::new(),
    };
    let mut parts = IndexMap::new();
    parts.insert("abstract".to_string(), part);
    let mut documents = IndexMap::new();
    documents.insert("PMID:1".to_string(), Document { parts });
    Dataset { documents }
}
