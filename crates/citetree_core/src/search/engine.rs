//! Substring search over the visible citation set.
//!
//! # Responsibility
//! - Produce ranked matches for a query over node text and annotations.
//! - Hold navigation state for ordered, wrapping result traversal.
//!
//! # Invariants
//! - Tombstoned nodes never match.
//! - A node contributes at most one result entry, aggregating its matches.
//! - Entries with a highlight match rank before annotation-only entries;
//!   the sort is stable, so original relative order is otherwise kept.

use crate::model::node::{CitationNode, NodeId};

/// Where a match was found on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOrigin {
    /// The node's captured text itself.
    Highlight,
    /// One annotation body, identified by its position in the node's
    /// annotation list.
    Annotation { index: usize },
}

/// One match inside a result entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMatch {
    pub origin: MatchOrigin,
}

/// Aggregated result entry for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEntry {
    pub node_id: NodeId,
    pub matches: Vec<SearchMatch>,
}

impl SearchEntry {
    /// Returns whether any match came from the node's own text.
    pub fn has_highlight_match(&self) -> bool {
        self.matches
            .iter()
            .any(|found| found.origin == MatchOrigin::Highlight)
    }
}

/// Search behavior options.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Whether annotation bodies participate in matching.
    pub include_annotations: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            include_annotations: true,
        }
    }
}

/// Ranked search results plus a circular navigation cursor.
#[derive(Debug, Default)]
pub struct SearchEngine {
    results: Vec<SearchEntry>,
    cursor: Option<usize>,
}

impl SearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a case-insensitive substring query over the given node set and
    /// replaces the current results.
    ///
    /// A blank query clears results and cursor. The node slice is expected
    /// to be a validated snapshot; tombstoned nodes are skipped regardless.
    pub fn perform_search(
        &mut self,
        query: &str,
        nodes: &[CitationNode],
        options: &SearchOptions,
    ) -> &[SearchEntry] {
        self.results.clear();
        self.cursor = None;

        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return &self.results;
        }

        for node in nodes {
            if !node.is_active() {
                continue;
            }

            let mut matches = Vec::new();
            if node.text.to_lowercase().contains(&needle) {
                matches.push(SearchMatch {
                    origin: MatchOrigin::Highlight,
                });
            }
            if options.include_annotations {
                for (index, annotation) in node.annotations.iter().enumerate() {
                    if annotation.text.to_lowercase().contains(&needle) {
                        matches.push(SearchMatch {
                            origin: MatchOrigin::Annotation { index },
                        });
                    }
                }
            }

            if !matches.is_empty() {
                self.results.push(SearchEntry {
                    node_id: node.id,
                    matches,
                });
            }
        }

        // Stable sort: highlight-bearing entries first, input order kept
        // within each group.
        self.results
            .sort_by_key(|entry| !entry.has_highlight_match());
        &self.results
    }

    /// Returns the ranked result entries.
    pub fn results(&self) -> &[SearchEntry] {
        &self.results
    }

    /// Returns the entry under the cursor, if navigation has started.
    pub fn current(&self) -> Option<&SearchEntry> {
        self.cursor.and_then(|index| self.results.get(index))
    }

    /// Advances the cursor forward, wrapping past the last result.
    pub fn navigate_to_next(&mut self) -> Option<&SearchEntry> {
        if self.results.is_empty() {
            return None;
        }
        let next = match self.cursor {
            None => 0,
            Some(index) => (index + 1) % self.results.len(),
        };
        self.cursor = Some(next);
        self.results.get(next)
    }

    /// Moves the cursor backward, wrapping before the first result.
    pub fn navigate_to_previous(&mut self) -> Option<&SearchEntry> {
        if self.results.is_empty() {
            return None;
        }
        let previous = match self.cursor {
            None | Some(0) => self.results.len() - 1,
            Some(index) => index - 1,
        };
        self.cursor = Some(previous);
        self.results.get(previous)
    }

    /// Renders the navigation counter as `"i of n"`.
    ///
    /// Zero results yield the explicit `"0 of 0"` state; before the first
    /// navigation step the position reads as zero.
    pub fn counter(&self) -> String {
        match (self.cursor, self.results.len()) {
            (_, 0) => "0 of 0".to_string(),
            (None, total) => format!("0 of {total}"),
            (Some(index), total) => format!("{} of {total}", index + 1),
        }
    }

    /// Clears results and cursor.
    pub fn clear(&mut self) {
        self.results.clear();
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{MatchOrigin, SearchEngine, SearchOptions};
    use crate::model::node::{Annotation, CitationNode};

    fn node_with_text(id: u64, text: &str) -> CitationNode {
        CitationNode::new(id, text, None, None, 0)
    }

    #[test]
    fn blank_query_clears_results() {
        let nodes = vec![node_with_text(1, "anything")];
        let mut engine = SearchEngine::new();
        engine.perform_search("anything", &nodes, &SearchOptions::default());
        assert_eq!(engine.results().len(), 1);

        engine.perform_search("   ", &nodes, &SearchOptions::default());
        assert!(engine.results().is_empty());
        assert_eq!(engine.counter(), "0 of 0");
    }

    #[test]
    fn matching_is_case_insensitive() {
        let nodes = vec![node_with_text(1, "Graph Theory Basics")];
        let mut engine = SearchEngine::new();
        let results = engine.perform_search("gRaPh", &nodes, &SearchOptions::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node_id, 1);
    }

    #[test]
    fn node_aggregates_multiple_annotation_matches_into_one_entry() {
        let mut node = node_with_text(3, "unrelated");
        node.annotations.push(Annotation::new("graph coloring", 1));
        node.annotations.push(Annotation::new("graph minors", 2));
        let nodes = vec![node];

        let mut engine = SearchEngine::new();
        let results = engine.perform_search("graph", &nodes, &SearchOptions::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matches.len(), 2);
        assert_eq!(
            results[0].matches[0].origin,
            MatchOrigin::Annotation { index: 0 }
        );
        assert_eq!(
            results[0].matches[1].origin,
            MatchOrigin::Annotation { index: 1 }
        );
    }

    #[test]
    fn annotations_can_be_excluded() {
        let mut node = node_with_text(3, "unrelated");
        node.annotations.push(Annotation::new("graph coloring", 1));
        let nodes = vec![node];

        let mut engine = SearchEngine::new();
        let options = SearchOptions {
            include_annotations: false,
        };
        assert!(engine.perform_search("graph", &nodes, &options).is_empty());
    }

    #[test]
    fn tombstoned_nodes_never_match() {
        let mut node = node_with_text(1, "graph theory");
        node.soft_delete(10);
        let nodes = vec![node];

        let mut engine = SearchEngine::new();
        assert!(engine
            .perform_search("graph", &nodes, &SearchOptions::default())
            .is_empty());
    }

    #[test]
    fn navigation_wraps_in_both_directions() {
        let nodes = vec![
            node_with_text(1, "graph a"),
            node_with_text(2, "graph b"),
            node_with_text(3, "graph c"),
        ];
        let mut engine = SearchEngine::new();
        engine.perform_search("graph", &nodes, &SearchOptions::default());

        assert_eq!(engine.navigate_to_next().unwrap().node_id, 1);
        assert_eq!(engine.navigate_to_next().unwrap().node_id, 2);
        assert_eq!(engine.navigate_to_next().unwrap().node_id, 3);
        assert_eq!(engine.navigate_to_next().unwrap().node_id, 1);
        assert_eq!(engine.counter(), "1 of 3");

        assert_eq!(engine.navigate_to_previous().unwrap().node_id, 3);
        assert_eq!(engine.counter(), "3 of 3");
    }

    #[test]
    fn navigation_on_empty_results_returns_none() {
        let mut engine = SearchEngine::new();
        assert!(engine.navigate_to_next().is_none());
        assert!(engine.navigate_to_previous().is_none());
        assert_eq!(engine.counter(), "0 of 0");
    }

    #[test]
    fn clear_resets_results_and_cursor() {
        let nodes = vec![node_with_text(1, "graph")];
        let mut engine = SearchEngine::new();
        engine.perform_search("graph", &nodes, &SearchOptions::default());
        engine.navigate_to_next();

        engine.clear();
        assert!(engine.results().is_empty());
        assert!(engine.current().is_none());
        assert_eq!(engine.counter(), "0 of 0");
    }
}
