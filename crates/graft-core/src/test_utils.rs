//! Test utilities for Graft

use crate::model::{FileEntry, RawGraph};

/// Build a raw graph from `(file, imports)` pairs.
pub fn graph(files: &[(&str, &[&str])]) -> RawGraph {
    files
        .iter()
        .map(|(file, imports)| (file.to_string(), FileEntry::importing(imports.iter().copied())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_helper() {
        let g = graph(&[("dummy/a.js", &["dummy/b"]), ("dummy/b.js", &[])]);
        assert_eq!(g.len(), 2);
        assert_eq!(g["dummy/a.js"].imports[0].source, "dummy/b");
        assert!(g["dummy/b.js"].imports.is_empty());
    }
}
