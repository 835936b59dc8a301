//! Small normalisers applied to scraped text and links.

/// Join text nodes the way a "strip" text getter does: trim every node,
/// drop the empty ones, concatenate the rest with no separator.
/// `"  Hello ", "\n", " world"` → `"Helloworld"`
pub fn stripped_text<'a, I>(nodes: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    nodes
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Trim an identifier read from an input file. Blank → `None`.
pub fn normalise_identifier(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

/// `/user/handle1` → `handle1`
pub fn handle_from_profile_href(href: &str) -> &str {
    href.rsplit('/').next().unwrap_or(href)
}

/// `/figures?id=12345` → `12345`
pub fn id_from_figure_href(href: &str) -> &str {
    href.rsplit('=').next().unwrap_or(href)
}

/// Ask the tweet page for its raw JSON form.
/// `/tweet?id=1&account=2` → `/tweet?id=1&account=2&raw=true`
pub fn raw_tweet_href(href: &str) -> String {
    if href.contains('?') {
        format!("{}&raw=true", href)
    } else {
        format!("{}?raw=true", href)
    }
}
