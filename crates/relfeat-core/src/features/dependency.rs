//! Combined dependency-based edge features.
//!
//! Four kinds of window are read around every edge:
//!
//! * OW (1 and 2): outer window, the tokens before entity 1 / entity 2
//! * IW (1 and 2): inner window, the tokens after entity 1 / entity 2
//! * LD: linear dependency, the tokens between the two entities
//! * PD: parsing dependency, the shortest path between the entity heads in the
//!   sentence's dependency graph
//!
//! Each window contributes lemma and POS n-grams plus two token counts; the
//! PD window also contributes n-grams of the relation labels along the path.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::DependencyConfig;
use crate::errors::{RelfeatError, RelfeatResult};
use crate::features::naming::{bracketed, feature_name, group_feature_name};
use crate::features::registry::FeatureSet;
use crate::features::window::{ngrams, DependencyWindow, WindowKind};
use crate::graphs::compute_shortest_path;
use crate::models::{check_token_ids, token_at, Dataset, Edge, EdgeContext, Token};

/// A named feature value computed for an edge, not yet registered.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureValue {
    pub name: String,
    pub value: f64,
}

impl FeatureValue {
    fn flag(name: String) -> Self {
        Self { name, value: 1.0 }
    }
}

/// An edge whose features could not be generated.
#[derive(Debug)]
pub struct EdgeFailure {
    /// Position of the edge in `Dataset::edges()` order.
    pub position: usize,
    pub part_id: String,
    pub error: RelfeatError,
}

#[derive(Debug, Default)]
pub struct GenerationReport {
    pub edges_seen: usize,
    pub features_added: usize,
    pub failures: Vec<EdgeFailure>,
}

impl GenerationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_positions(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.position).collect()
    }
}

pub struct DependencyFeatureGenerator {
    config: DependencyConfig,
}

impl DependencyFeatureGenerator {
    pub fn new(config: DependencyConfig) -> RelfeatResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DependencyConfig {
        &self.config
    }

    /// The six windows of an edge, in OW1, IW1, OW2, IW2, LD, PD order.
    pub fn windows<'s>(
        &self,
        edge: &Edge,
        sentence: &'s [Token],
    ) -> RelfeatResult<Vec<DependencyWindow<'s>>> {
        let e1 = &edge.entity1;
        let e2 = &edge.entity2;
        check_token_ids(sentence)?;
        for &token_id in e1.tokens.iter().chain(&e2.tokens) {
            token_at(sentence, token_id)?;
        }

        let reading_order = |mut tokens: Vec<&'s Token>| {
            tokens.reverse();
            tokens
        };
        let ow1 = reading_order(e1.prev_tokens(sentence, self.config.ow_size));
        let iw1 = e1.next_tokens(sentence, self.config.iw_size);
        let ow2 = reading_order(e2.prev_tokens(sentence, self.config.ow_size));
        let iw2 = e2.next_tokens(sentence, self.config.iw_size);

        let after_e1 = e1
            .next_tokens(sentence, 1)
            .first()
            .map(|t| t.id)
            .ok_or_else(|| {
                RelfeatError::WindowOutOfBounds(format!(
                    "no token follows entity {:?} in sentence {}",
                    e1.text, edge.sentence_id
                ))
            })?;
        let e2_start = e2.first_token().ok_or_else(|| {
            RelfeatError::WindowOutOfBounds(format!("entity {:?} covers no tokens", e2.text))
        })?;
        let ld: Vec<&Token> = if after_e1 < e2_start {
            sentence[after_e1..e2_start].iter().collect()
        } else {
            Vec::new()
        };

        let pd = compute_shortest_path(sentence, e1.head_token, e2.head_token)?;

        Ok(vec![
            DependencyWindow::Tokens { kind: WindowKind::Ow1, tokens: ow1 },
            DependencyWindow::Tokens { kind: WindowKind::Iw1, tokens: iw1 },
            DependencyWindow::Tokens { kind: WindowKind::Ow2, tokens: ow2 },
            DependencyWindow::Tokens { kind: WindowKind::Iw2, tokens: iw2 },
            DependencyWindow::Tokens { kind: WindowKind::Ld, tokens: ld },
            DependencyWindow::Path(pd),
        ])
    }

    /// All feature values of one edge.  Fails before producing anything if a
    /// window cannot be built.
    pub fn edge_features(
        &self,
        edge: &Edge,
        sentence: &[Token],
    ) -> RelfeatResult<Vec<FeatureValue>> {
        let windows = self.windows(edge, sentence)?;
        let mut out = Vec::new();
        for window in &windows {
            for &n_gram in self.config.grams(window.kind().family()) {
                self.add_all(window, n_gram, &mut out);
            }
        }
        Ok(out)
    }

    fn add_all(&self, window: &DependencyWindow<'_>, n_gram: usize, out: &mut Vec<FeatureValue>) {
        let templates = &self.config.templates;
        let kind = window.kind();
        let tokens = window.tokens();

        if let DependencyWindow::Path(path) = window {
            if let Some(template) = templates.undirected_edges_n_gram.as_deref() {
                let base = feature_name(template, kind, n_gram);
                for group in ngrams(path.labels(), n_gram) {
                    let value = bracketed(group.iter().copied());
                    out.push(FeatureValue::flag(group_feature_name(&base, &value)));
                }
            }
        }

        let attribute_grams: [(Option<&str>, fn(&Token) -> &str); 2] = [
            (templates.lemma_n_gram.as_deref(), |t| t.lemma.as_str()),
            (templates.pos_n_gram.as_deref(), |t| t.pos.as_str()),
        ];
        for (template, attribute) in attribute_grams {
            let Some(template) = template else {
                continue;
            };
            let base = feature_name(template, kind, n_gram);
            for group in ngrams(tokens, n_gram) {
                let value = bracketed(group.iter().map(|t| attribute(t)));
                out.push(FeatureValue::flag(group_feature_name(&base, &value)));
            }
        }

        if let Some(template) = templates.tokens_count_n_gram.as_deref() {
            out.push(FeatureValue {
                name: feature_name(template, kind, n_gram),
                value: tokens.len() as f64,
            });
        }
        if let Some(template) = templates.tokens_count_without_punct_n_gram.as_deref() {
            let count = tokens.iter().filter(|t| !t.is_punct).count();
            out.push(FeatureValue {
                name: feature_name(template, kind, n_gram),
                value: count as f64,
            });
        }
    }

    fn insert(
        features: &mut FeatureSet,
        edge: &mut Edge,
        values: &[FeatureValue],
        is_train: bool,
    ) -> usize {
        values
            .iter()
            .filter(|fv| features.add_to_edge(&mut edge.features, &fv.name, fv.value, is_train))
            .count()
    }

    /// Generate the features of a single edge.  Returns how many values were
    /// stored.
    pub fn generate_edge(
        &self,
        edge: &mut Edge,
        sentence: &[Token],
        features: &mut FeatureSet,
        is_train: bool,
    ) -> RelfeatResult<usize> {
        let values = self.edge_features(edge, sentence)?;
        Ok(Self::insert(features, edge, &values, is_train))
    }

    fn context_features(&self, ctx: &EdgeContext<'_>) -> RelfeatResult<Vec<FeatureValue>> {
        let sentence = ctx.combined_sentence()?;
        self.edge_features(ctx.edge, sentence)
    }

    /// Generate features for every edge of the dataset.
    ///
    /// Edges that fail keep their feature map untouched and are listed in the
    /// report.  Feature names are registered in dataset order, so the parallel
    /// and sequential modes assign identical indices.
    pub fn generate(
        &self,
        dataset: &mut Dataset,
        features: &mut FeatureSet,
        is_train: bool,
    ) -> GenerationReport {
        let computed: Vec<(String, RelfeatResult<Vec<FeatureValue>>)> = {
            let contexts: Vec<EdgeContext<'_>> = dataset.edge_contexts().collect();
            if self.config.parallel {
                contexts
                    .par_iter()
                    .map(|ctx| (ctx.part_id.to_string(), self.context_features(ctx)))
                    .collect()
            } else {
                contexts
                    .iter()
                    .map(|ctx| (ctx.part_id.to_string(), self.context_features(ctx)))
                    .collect()
            }
        };

        let mut report = GenerationReport::default();
        let outcomes = dataset.edges_mut().zip(computed).enumerate();
        for (position, (edge, (part_id, outcome))) in outcomes {
            report.edges_seen += 1;
            match outcome {
                Ok(values) => {
                    let added = Self::insert(features, edge, &values, is_train);
                    debug!("Edge {position} in {part_id}: {added} dependency features");
                    report.features_added += added;
                }
                Err(error) => {
                    warn!("Skipping dependency features of edge {position} in {part_id}: {error}");
                    report.failures.push(EdgeFailure {
                        position,
                        part_id,
                        error,
                    });
                }
            }
        }

        info!(
            "Dependency features: {} edges, {} values, {} failures, {} names registered",
            report.edges_seen,
            report.features_added,
            report.failures.len(),
            features.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureTemplates;
    use crate::fixtures::{disconnected_sentence, sample_dataset, sample_edge, sample_sentence};
    use crate::models::Entity;

    fn generator() -> DependencyFeatureGenerator {
        DependencyFeatureGenerator::new(DependencyConfig::default()).unwrap()
    }

    fn words(window: &DependencyWindow<'_>) -> Vec<String> {
        window.tokens().iter().map(|t| t.word.clone()).collect()
    }

    fn names(values: &[FeatureValue]) -> Vec<&str> {
        values.iter().map(|fv| fv.name.as_str()).collect()
    }

    #[test]
    fn windows_around_sample_edge() {
        let sentence = sample_sentence();
        let windows = generator().windows(&sample_edge(), &sentence).unwrap();
        let kinds: Vec<WindowKind> = windows.iter().map(|w| w.kind()).collect();
        assert_eq!(kinds, WindowKind::ALL.to_vec());

        assert_eq!(words(&windows[0]), vec!["Recent", "studies", "show", "that"]);
        assert_eq!(words(&windows[1]), vec!["binds", "directly", "to", "MDM2"]);
        assert_eq!(words(&windows[2]), vec!["p53", "binds", "directly", "to"]);
        assert_eq!(words(&windows[3]), vec!["in", "human", "cells", "."]);
        assert_eq!(words(&windows[4]), vec!["binds", "directly", "to"]);
        assert_eq!(words(&windows[5]), vec!["p53", "binds", "to", "MDM2"]);
    }

    #[test]
    fn windows_reconstruct_contiguous_span() {
        let sentence = sample_sentence();
        let edge = sample_edge();
        let windows = generator().windows(&edge, &sentence).unwrap();

        let mut ids: Vec<usize> = windows[0].tokens().iter().map(|t| t.id).collect();
        ids.extend(&edge.entity1.tokens);
        ids.extend(windows[4].tokens().iter().map(|t| t.id));
        ids.extend(&edge.entity2.tokens);
        ids.extend(windows[3].tokens().iter().map(|t| t.id));

        let start = ids[0];
        let expected: Vec<usize> = (start..start + ids.len()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn windows_shrink_near_sentence_bounds() {
        let sentence = sample_sentence();
        let edge = Edge::new(
            Entity::new("e_1", "Recent", 0, vec![0], 0),
            Entity::new("e_2", "cells", 61, vec![11], 11),
            "r_1",
            0,
        );
        let windows = generator().windows(&edge, &sentence).unwrap();
        assert!(windows[0].tokens().is_empty());
        assert_eq!(words(&windows[3]), vec!["."]);
        assert_eq!(windows[4].tokens().len(), 10);
    }

    #[test]
    fn adjacent_entities_have_empty_linear_window() {
        let sentence = sample_sentence();
        let edge = Edge::new(
            Entity::new("e_1", "that", 20, vec![3], 3),
            Entity::new("e_2", "p53", 25, vec![4], 4),
            "r_1",
            0,
        );
        let windows = generator().windows(&edge, &sentence).unwrap();
        assert!(windows[4].tokens().is_empty());
    }

    #[test]
    fn entity_at_sentence_end_is_out_of_bounds() {
        let sentence = sample_sentence();
        let edge = Edge::new(
            Entity::new("e_1", "cells", 61, vec![11, 12], 11),
            Entity::new("e_2", ".", 67, vec![12], 12),
            "r_1",
            0,
        );
        let err = generator().windows(&edge, &sentence).unwrap_err();
        assert!(matches!(err, RelfeatError::WindowOutOfBounds(_)));
    }

    #[test]
    fn shifted_token_ids_fail_instead_of_slicing() {
        let mut sentence = sample_sentence();
        for token in &mut sentence[5..] {
            token.id += 3;
        }
        let mut edge = sample_edge();
        let mut features = FeatureSet::new();
        let err = generator()
            .generate_edge(&mut edge, &sentence, &mut features, true)
            .unwrap_err();
        assert!(matches!(
            err,
            RelfeatError::MisalignedToken { position: 5, token_id: 8 }
        ));
        assert!(err.is_edge_error());
        assert!(edge.features.is_empty());
    }

    #[test]
    fn entity_tokens_past_sentence_end_are_reported() {
        let sentence = sample_sentence();
        let edge = Edge::new(
            Entity::new("e_1", "p53", 25, vec![4], 4),
            Entity::new("e_2", "ghost", 90, vec![20], 20),
            "r_1",
            0,
        );
        let err = generator().windows(&edge, &sentence).unwrap_err();
        assert!(matches!(err, RelfeatError::TokenNotFound { token_id: 20, .. }));
    }

    #[test]
    fn lemma_and_pos_ngrams() {
        let sentence = sample_sentence();
        let values = generator().edge_features(&sample_edge(), &sentence).unwrap();
        let names = names(&values);
        assert!(names.contains(&"LD_lemma_2_gram_[bind directly]"));
        assert!(names.contains(&"LD_pos_3_gram_[VBZ RB TO]"));
        assert!(names.contains(&"OW_lemma_1_gram_1_[study]"));
        assert!(names.contains(&"OW_lemma_4_gram_2_[p53 bind directly to]"));
        assert!(names.contains(&"IW_pos_2_gram_2_[JJ NNS]"));
        assert!(names.contains(&"PD_lemma_4_gram_[p53 bind to mdm2]"));
    }

    #[test]
    fn ngram_values_hold_n_items() {
        let sentence = sample_sentence();
        let values = generator().edge_features(&sample_edge(), &sentence).unwrap();
        for fv in &values {
            let Some(start) = fv.name.find("_[") else {
                continue;
            };
            let value = &fv.name[start + 1..];
            assert!(value.starts_with('[') && value.ends_with(']'), "{value}");
            let n: usize = fv.name[..start]
                .split('_')
                .find_map(|part| part.parse().ok())
                .unwrap();
            assert_eq!(value[1..value.len() - 1].split(' ').count(), n, "{}", fv.name);
        }
    }

    #[test]
    fn oversized_grams_emit_no_group() {
        let sentence = sample_sentence();
        let values = generator().edge_features(&sample_edge(), &sentence).unwrap();
        // LD has three tokens: no 4-grams, but the counts are still there.
        assert!(!values.iter().any(|fv| fv.name.starts_with("LD_lemma_4_gram_[")));
        let count = values
            .iter()
            .find(|fv| fv.name == "LD_tokens_count_4_gram")
            .unwrap();
        assert_eq!(count.value, 3.0);
    }

    #[test]
    fn counts_skip_punctuation() {
        let sentence = sample_sentence();
        let values = generator().edge_features(&sample_edge(), &sentence).unwrap();
        let value_of = |name: &str| values.iter().find(|fv| fv.name == name).unwrap().value;
        assert_eq!(value_of("IW_tokens_count_1_gram_2"), 4.0);
        assert_eq!(value_of("IW_tokens_count_without_punct_1_gram_2"), 3.0);
        assert_eq!(value_of("PD_tokens_count_2_gram"), 4.0);
    }

    #[test]
    fn undirected_edges_follow_path_labels() {
        let sentence = sample_sentence();
        let values = generator().edge_features(&sample_edge(), &sentence).unwrap();
        let names = names(&values);
        assert!(names.contains(&"PD_undirected_edges_1_gram_[nsubj]"));
        assert!(names.contains(&"PD_undirected_edges_2_gram_[prep pobj]"));
        assert!(names.contains(&"PD_undirected_edges_3_gram_[nsubj prep pobj]"));
        assert!(!names.iter().any(|n| n.starts_with("PD_undirected_edges_4_gram")));
        assert!(!names.iter().any(|n| n.starts_with("LD_undirected_edges")));
    }

    #[test]
    fn disabled_templates_are_skipped() {
        let config = DependencyConfig {
            templates: FeatureTemplates {
                lemma_n_gram: Some("XX_lemma_N_gram".to_string()),
                ..FeatureTemplates::disabled()
            },
            ..DependencyConfig::default()
        };
        let generator = DependencyFeatureGenerator::new(config).unwrap();
        let sentence = sample_sentence();
        let values = generator.edge_features(&sample_edge(), &sentence).unwrap();
        assert!(!values.is_empty());
        assert!(values.iter().all(|fv| fv.name.contains("_lemma_")));

        let silent = DependencyFeatureGenerator::new(DependencyConfig {
            templates: FeatureTemplates::disabled(),
            ..DependencyConfig::default()
        })
        .unwrap();
        assert!(silent.edge_features(&sample_edge(), &sentence).unwrap().is_empty());
    }

    #[test]
    fn empty_gram_list_disables_family() {
        let generator = DependencyFeatureGenerator::new(DependencyConfig {
            pd_grams: Vec::new(),
            ..DependencyConfig::default()
        })
        .unwrap();
        let sentence = sample_sentence();
        let values = generator.edge_features(&sample_edge(), &sentence).unwrap();
        assert!(!values.iter().any(|fv| fv.name.starts_with("PD_")));
    }

    #[test]
    fn disconnected_heads_fail_the_edge() {
        let sentence = disconnected_sentence();
        let edge = Edge::new(
            Entity::new("e_1", "studies", 7, vec![1], 1),
            Entity::new("e_2", "MDM2", 47, vec![8], 8),
            "r_1",
            0,
        );
        let mut features = FeatureSet::new();
        let mut target = edge.clone();
        let err = generator()
            .generate_edge(&mut target, &sentence, &mut features, true)
            .unwrap_err();
        assert!(matches!(err, RelfeatError::NoDependencyPath { from: 1, to: 8 }));
        assert!(err.is_edge_error());
        assert!(target.features.is_empty());
        assert!(features.is_empty());
    }

    #[test]
    fn generation_is_idempotent() {
        let sentence = sample_sentence();
        let generator = generator();
        let mut features = FeatureSet::new();
        let mut edge = sample_edge();
        generator.generate_edge(&mut edge, &sentence, &mut features, true).unwrap();
        let first = edge.features.clone();
        let registered = features.len();
        generator.generate_edge(&mut edge, &sentence, &mut features, true).unwrap();
        assert_eq!(edge.features, first);
        assert_eq!(features.len(), registered);
    }

    #[test]
    fn inference_uses_training_indices() {
        let generator = generator();
        let mut features = FeatureSet::new();
        let mut train = sample_dataset(&[1]);
        generator.generate(&mut train, &mut features, true);
        let registered = features.len();

        let mut test = sample_dataset(&[-1]);
        for part in test.documents.values_mut().flat_map(|d| d.parts.values_mut()) {
            part.sentences[0][6].lemma = "strongly".to_string();
        }
        let report = generator.generate(&mut test, &mut features, false);
        assert!(report.is_complete());
        assert_eq!(features.len(), registered);

        let train_features = &train.edges().next().unwrap().features;
        let test_features = &test.edges().next().unwrap().features;
        assert!(test_features.len() < train_features.len());
        for (index, value) in test_features {
            assert!(features.contains_index(*index));
            assert!(value.is_finite());
        }
        let strongly = test_features
            .keys()
            .filter_map(|&i| features.name_of(i))
            .any(|name| name.contains("strongly"));
        assert!(!strongly);
    }

    #[test]
    fn generate_reports_failed_edges_and_continues() {
        let mut dataset = sample_dataset(&[1, -1, 1]);
        {
            let part = dataset
                .documents
                .values_mut()
                .flat_map(|d| d.parts.values_mut())
                .next()
                .unwrap();
            part.edges[1].sentence_id = 3;
        }
        let mut features = FeatureSet::new();
        let report = generator().generate(&mut dataset, &mut features, true);
        assert_eq!(report.edges_seen, 3);
        assert_eq!(report.failed_positions(), vec![1]);
        assert!(matches!(
            report.failures[0].error,
            RelfeatError::MissingSentence { sentence_id: 3, .. }
        ));
        assert_eq!(report.failures[0].part_id, "abstract");

        let sizes: Vec<usize> = dataset.edges().map(|e| e.features.len()).collect();
        assert!(sizes[0] > 0);
        assert_eq!(sizes[1], 0);
        assert_eq!(sizes[0], sizes[2]);
    }

    #[test]
    fn parallel_matches_sequential() {
        let mut sequential_set = FeatureSet::new();
        let mut sequential = sample_dataset(&[1, -1, 1, -1]);
        generator().generate(&mut sequential, &mut sequential_set, true);

        let parallel_generator = DependencyFeatureGenerator::new(DependencyConfig {
            parallel: true,
            ..DependencyConfig::default()
        })
        .unwrap();
        let mut parallel_set = FeatureSet::new();
        let mut parallel = sample_dataset(&[1, -1, 1, -1]);
        parallel_generator.generate(&mut parallel, &mut parallel_set, true);

        assert_eq!(parallel_set, sequential_set);
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = DependencyFeatureGenerator::new(DependencyConfig {
            ow_grams: vec![0],
            ..DependencyConfig::default()
        });
        assert!(result.is_err());
    }
}
