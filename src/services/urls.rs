use url::Url;

/// Canonical form of a submitted URL, used only for equality comparison in
/// the duplicate report. Total function: anything unparseable falls back to
/// the trimmed, lower-cased input.
///
/// Purely syntactic on purpose: no redirect resolution or query pruning.
/// Lower-casing covers the whole string, so links differing only in path
/// case collapse together even where the server would treat them as
/// distinct resources.
pub(crate) fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();

    let Ok(parsed) = Url::parse(trimmed) else {
        return trimmed.to_lowercase();
    };

    let mut href = parsed.as_str().to_lowercase();

    // http and https versions of the same link count as the same submission.
    if let Some(rest) = href.strip_prefix("http://") {
        href = format!("https://{rest}");
    }

    href = href.replacen("://www.", "://", 1);

    while href.ends_with('/') {
        href.pop();
    }

    href
}
