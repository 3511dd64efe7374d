//! URL assembly helpers shared by the resolver and the request preview.

/// Strip surrounding whitespace and any trailing `/` from a base URL.
pub fn trim_base_url(base: &str) -> &str {
    base.trim().trim_end_matches('/')
}

/// Compose `base[/service][?query]` the way the request console previews it.
///
/// Leading and trailing slashes are removed from `service`, leading `?` from
/// `query`, and trailing slashes from `base`. Empty parts are omitted.
pub fn build_preview_url(base: &str, service: &str, query: &str) -> String {
    let service = service.trim().trim_matches('/');
    let query = query.trim().trim_start_matches('?');

    let mut url = trim_base_url(base).to_string();
    if !service.is_empty() {
        url.push('/');
        url.push_str(service);
    }
    if !query.is_empty() {
        url.push('?');
        url.push_str(query);
    }
    url
}
