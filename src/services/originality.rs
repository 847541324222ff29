use std::collections::BTreeMap;

use serde::Serialize;

use crate::services::urls;
use crate::storage::{LedgerStore, StoreError, SubmissionWithStudent};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DuplicateMember {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) original_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DuplicateGroup {
    pub(crate) normalized_url: String,
    pub(crate) count: usize,
    pub(crate) students: Vec<DuplicateMember>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OriginalityReport {
    pub(crate) total_submissions: usize,
    pub(crate) unique_links: usize,
    pub(crate) unique_count: usize,
    pub(crate) duplicate_count: usize,
    pub(crate) duplicates: Vec<DuplicateGroup>,
    pub(crate) originality_percentage: u32,
}

pub(crate) async fn analyze(
    store: &dyn LedgerStore,
    activity_id: &str,
) -> Result<OriginalityReport, StoreError> {
    let submissions = store.list_activity_submissions(activity_id).await?;
    Ok(compute_report(&submissions))
}

/// Groups an activity's submissions by normalized URL. Every group shared by
/// more than one student is a duplicate group; students keep their original
/// URL for display. Deterministic: groups are ordered by size (largest
/// first), then by normalized URL, and members by name.
pub(crate) fn compute_report(submissions: &[SubmissionWithStudent]) -> OriginalityReport {
    let mut groups: BTreeMap<String, Vec<DuplicateMember>> = BTreeMap::new();
    for submission in submissions {
        groups.entry(urls::normalize(&submission.url)).or_default().push(DuplicateMember {
            id: submission.user_id.clone(),
            name: submission.student_name.clone(),
            email: submission.student_email.clone(),
            original_url: submission.url.clone(),
        });
    }

    let total_submissions = submissions.len();
    let unique_links = groups.len();

    let mut duplicates: Vec<DuplicateGroup> = groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(normalized_url, mut members)| {
            members.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
            DuplicateGroup { count: members.len(), normalized_url, students: members }
        })
        .collect();
    duplicates.sort_by(|a, b| {
        b.count.cmp(&a.count).then_with(|| a.normalized_url.cmp(&b.normalized_url))
    });

    let duplicate_count: usize = duplicates.iter().map(|group| group.count).sum();
    let unique_count = total_submissions - duplicate_count;
    let originality_percentage = if total_submissions == 0 {
        100
    } else {
        (100.0 * unique_count as f64 / total_submissions as f64).round() as u32
    };

    OriginalityReport {
        total_submissions,
        unique_links,
        unique_count,
        duplicate_count,
        duplicates,
        originality_percentage,
    }
}
