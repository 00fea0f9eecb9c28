// ── Container image helpers ──

/// Whether `image` appears in a `repository:tag` listing, one per line.
///
/// An image named without a tag matches any tag of that repository.
pub fn image_listed(listing: &str, image: &str) -> bool {
    let (want_repo, want_tag) = split_reference(image);
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .any(|line| {
            let (repo, tag) = split_reference(line);
            repo == want_repo && want_tag.is_none_or(|t| Some(t) == tag)
        })
}

/// Split `repo[:tag]`. A colon inside a registry host (`host:5000/img`)
/// is not a tag separator.
fn split_reference(reference: &str) -> (&str, Option<&str>) {
    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, Some(tag)),
        _ => (reference, None),
    }
}
