//! Topic name and topic filter validation and matching.
//!
//! Matching walks both strings segment-by-segment (split on `/`) rather
//! than allocating a `Vec` of segments, since filters and names are both
//! bounded by `MAX_TOPIC` and segment counts are small in practice.

/// A topic filter split into its shared-subscription group (if any) and
/// the filter proper.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ParsedFilter<'a> {
    /// The share group name, e.g. `"workers"` for `$share/workers/a/b`.
    pub share_group: Option<&'a str>,
    /// The filter with any `$share/<group>/` prefix stripped.
    pub filter: &'a str,
}

/// Parse a subscription filter, recognising the `$share/<group>/` prefix
/// for shared subscriptions.
pub fn parse_filter(raw: &str) -> ParsedFilter<'_> {
    if let Some(rest) = raw.strip_prefix("$share/") {
        if let Some(slash) = rest.find('/') {
            let group = &rest[..slash];
            let filter = &rest[slash + 1..];
            if !group.is_empty() {
                return ParsedFilter {
                    share_group: Some(group),
                    filter,
                };
            }
        }
    }
    ParsedFilter {
        share_group: None,
        filter: raw,
    }
}

/// Validate a topic *name* (used in PUBLISH): must be non-empty and must
/// not contain `+`, `#`, or a null character. Unlike filters, wildcards
/// are never legal in a published topic name.
pub fn validate_topic_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['+', '#', '\0'])
}

/// Validate a topic *filter* (used in SUBSCRIBE/UNSUBSCRIBE), including
/// an optional `$share/<group>/` prefix. Wildcard placement rules:
/// `+` must occupy an entire segment; `#` must occupy an entire segment
/// and be the last segment in the filter.
pub fn validate_topic_filter(raw: &str) -> bool {
    let parsed = parse_filter(raw);
    if let Some(group) = parsed.share_group {
        if group.contains(['+', '#', '/']) {
            return false;
        }
    }
    let filter = parsed.filter;
    if filter.is_empty() || filter.contains('\0') {
        return false;
    }
    let mut segments = filter.split('/').peekable();
    while let Some(seg) = segments.next() {
        let is_last = segments.peek().is_none();
        if seg.contains('#') && (seg != "#" || !is_last) {
            return false;
        }
        if seg.contains('+') && seg != "+" {
            return false;
        }
    }
    true
}

/// Whether topic `name` (from an inbound PUBLISH) matches subscription
/// `filter` (the filter part only, with any `$share/` prefix already
/// stripped by the caller).
///
/// Per the MQTT v5 spec, a filter starting with `$` never matches a
/// topic beginning with `$` unless the filter's first segment is a
/// literal match, i.e. `+` and `#` in the first segment never match a
/// leading `$`.
pub fn matches(filter: &str, name: &str) -> bool {
    let mut f_segs = filter.split('/');
    let mut n_segs = name.split('/');
    let mut first = true;
    loop {
        let f = f_segs.next();
        let n = n_segs.next();
        match (f, n) {
            (Some("#"), _) => {
                if first && name.starts_with('$') {
                    return false;
                }
                return true;
            }
            (Some("+"), Some(n_seg)) => {
                if first && n_seg.starts_with('$') {
                    return false;
                }
            }
            (Some(f_seg), Some(n_seg)) => {
                if f_seg != n_seg {
                    return false;
                }
            }
            (Some(_), None) => return false,
            (None, Some(_)) => return false,
            (None, None) => return true,
        }
        first = false;
    }
}
