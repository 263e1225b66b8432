//! Pure helpers over an ordered version list (oldest first). The most recent
//! version is current by default; navigation clamps rather than cycles.

use db::models::document::DocumentVersion;

pub fn current_index(versions: &[DocumentVersion]) -> usize {
    versions.len().saturating_sub(1)
}

pub fn is_current(index: usize, versions: &[DocumentVersion]) -> bool {
    index == current_index(versions)
}

/// Content of the version at `index`, or an empty string when out of range.
/// Lenient on purpose: the UI probes speculative indices during transitions
/// and must never hit a panic path for that.
pub fn content_at(versions: &[DocumentVersion], index: usize) -> &str {
    versions
        .get(index)
        .map(|version| version.content.as_str())
        .unwrap_or("")
}

pub fn next(index: usize, versions: &[DocumentVersion]) -> usize {
    (index + 1).min(current_index(versions))
}

pub fn prev(index: usize) -> usize {
    index.saturating_sub(1)
}

pub fn latest(versions: &[DocumentVersion]) -> usize {
    current_index(versions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use db::models::document::ArtifactKind;
    use uuid::Uuid;

    fn versions(contents: &[&str]) -> Vec<DocumentVersion> {
        let document_id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        let base = Utc::now();
        contents
            .iter()
            .enumerate()
            .map(|(i, content)| DocumentVersion {
                id: Uuid::new_v4(),
                document_id,
                owner_id,
                title: "Essay".to_string(),
                kind: ArtifactKind::Text,
                content: content.to_string(),
                created_at: base + Duration::milliseconds(i as i64),
            })
            .collect()
    }

    #[test]
    fn most_recent_version_is_current() {
        let versions = versions(&["A", "B", "C"]);
        assert_eq!(current_index(&versions), 2);
        assert!(is_current(2, &versions));
        assert!(!is_current(0, &versions));
    }

    #[test]
    fn content_at_is_lenient_out_of_range() {
        let versions = versions(&["A"]);
        assert_eq!(content_at(&versions, 0), "A");
        assert_eq!(content_at(&versions, 5), "");
        assert_eq!(content_at(&[], 0), "");
    }

    #[test]
    fn navigation_clamps_at_both_ends() {
        let versions = versions(&["A", "B", "C"]);
        assert_eq!(next(2, &versions), 2);
        assert_eq!(next(1, &versions), 2);
        assert_eq!(prev(0), 0);
        assert_eq!(prev(2), 1);
        assert_eq!(latest(&versions), 2);
    }
}
