//! Text rendering utilities for human-friendly output.
//!
//! Used by error messages (resolution chains, "did you mean?" hints)
//! and by the condition evaluation report.

/// Renders a resolution chain as a readable string.
///
/// # Examples
/// ```
/// use wired_support::rendering::render_chain;
///
/// let chain = vec!["OrderService", "PaymentGateway", "OrderService"];
/// assert_eq!(render_chain(&chain), "OrderService → PaymentGateway → OrderService");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Renders a titled bullet list, one item per line.
///
/// An empty list renders as `title: (none)` so reports stay aligned.
///
/// ```
/// use wired_support::rendering::render_bullets;
///
/// let out = render_bullets("matched", &["feature.enabled=true"], 2);
/// assert_eq!(out, "  matched:\n    - feature.enabled=true\n");
/// ```
pub fn render_bullets(title: &str, items: &[impl AsRef<str>], indent: usize) -> String {
    let pad = " ".repeat(indent);
    if items.is_empty() {
        return format!("{pad}{title}: (none)\n");
    }

    let mut out = format!("{pad}{title}:\n");
    for item in items {
        out.push_str(&pad);
        out.push_str("  - ");
        out.push_str(item.as_ref());
        out.push('\n');
    }
    out
}

/// Shortens a fully qualified type name for display.
///
/// Every path segment is reduced to its last component, generic
/// arguments included.
///
/// ```
/// use wired_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("shop::billing::Invoice"), "Invoice");
/// assert_eq!(
///     shorten_type_name("alloc::sync::Arc<dyn shop::billing::Gateway>"),
///     "Arc<dyn Gateway>"
/// );
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut chars = full_name.chars().peekable();
    let mut segment = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '&' | '(' | ')' | '[' | ']' | ';' => {
                result.push_str(&segment);
                result.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    result.push_str(&segment);
    result
}

/// Ranks registered type names by similarity to a requested one.
///
/// Returns at most `max_suggestions` names, best match first.
pub fn suggest_similar(
    requested: &str,
    available: &[&str],
    max_suggestions: usize,
) -> Vec<String> {
    let requested_lower = requested.to_lowercase();
    let requested_short = shorten_type_name(requested).to_lowercase();

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .filter(|&&name| name != requested)
        .filter_map(|&name| {
            let name_lower = name.to_lowercase();
            let name_short = shorten_type_name(name).to_lowercase();

            if name_lower.contains(&requested_lower) || requested_lower.contains(&name_lower) {
                return Some((name, 100));
            }

            if name_short.contains(&requested_short) || requested_short.contains(&name_short) {
                return Some((name, 80));
            }

            let common = name_short
                .chars()
                .zip(requested_short.chars())
                .take_while(|(a, b)| a == b)
                .count();

            (common >= 3).then_some((name, common * 10))
        })
        .collect();

    // stable: equal scores keep registration order
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| name.to_string())
        .collect()
}
