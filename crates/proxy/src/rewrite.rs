//! Upstream URL construction and header filtering.

use http::{HeaderMap, HeaderName, header};
use url::Url;

/// Headers that must not be forwarded (hop-by-hop).
pub(crate) const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Joins two paths with exactly one `/` at the junction.
#[must_use]
pub fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (true, false) | (false, true) => format!("{a}{b}"),
        (false, false) => format!("{a}/{b}"),
    }
}

enum Dot {
    Current,
    Parent,
}

/// `.` or `..`, in raw or percent-encoded form.
fn dot_segment(segment: &str) -> Option<Dot> {
    match segment.to_ascii_lowercase().replace("%2e", ".").as_str() {
        "." => Some(Dot::Current),
        ".." => Some(Dot::Parent),
        _ => None,
    }
}

/// Lexically cleans an absolute request path: collapses repeated slashes,
/// drops `.` segments and resolves `..` without climbing above `/`. Encoded
/// dots count as dots, and `\` as a separator, since [`Url`] treats them so.
/// A trailing slash is kept.
#[must_use]
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match dot_segment(segment) {
            Some(Dot::Current) => {}
            Some(Dot::Parent) => {
                segments.pop();
            }
            None if segment.is_empty() => {}
            None => segments.push(segment),
        }
    }
    let mut cleaned = format!("/{}", segments.join("/"));
    let trailing = path.ends_with(['/', '\\'])
        || path
            .rsplit(['/', '\\'])
            .next()
            .is_some_and(|last| dot_segment(last).is_some());
    if trailing && cleaned.len() > 1 {
        cleaned.push('/');
    }
    cleaned
}

/// Target URL for an inbound request: the base URL's path joined with the
/// cleaned inbound path, and the inbound query in place of any query on the
/// base.
///
/// The query passes through [`Url`], which percent-encodes the few bytes it
/// does not allow raw (`"`, `'` on http(s), `<`, `>`, space).
#[must_use]
pub fn upstream_url(base: &Url, path: &str, query: Option<&str>) -> Url {
    let mut url = base.clone();
    url.set_path(&single_joining_slash(base.path(), &clean_path(path)));
    url.set_query(query.filter(|q| !q.is_empty()));
    url.set_fragment(None);
    url
}

/// `true` for headers the proxy owns and never copies between legs.
fn is_excluded(name: &HeaderName) -> bool {
    name == header::HOST
        || name == header::AUTHORIZATION
        || HOP_BY_HOP.contains(&name.as_str())
}

/// Header names a `Connection` header marks as hop-by-hop for this message,
/// lowercased.
fn connection_listed(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Appends every header of `src` to `dst` except `Host`, `Authorization`,
/// hop-by-hop headers and any header named in `Connection`. Repeated headers
/// keep all their values.
pub fn copy_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    let listed = connection_listed(src);
    for (name, value) in src {
        if !is_excluded(name) && !listed.iter().any(|l| l == name.as_str()) {
            dst.append(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_single_joining_slash() {
        assert_eq!(single_joining_slash("/v1/", "/chat"), "/v1/chat");
        assert_eq!(single_joining_slash("/v1", "chat"), "/v1/chat");
        assert_eq!(single_joining_slash("/v1", "/chat"), "/v1/chat");
        assert_eq!(single_joining_slash("/v1/", "chat"), "/v1/chat");
    }

    #[test]
    fn test_single_joining_slash_root() {
        assert_eq!(single_joining_slash("/", "/models"), "/models");
        assert_eq!(single_joining_slash("", "/models"), "/models");
        assert_eq!(single_joining_slash("/", "/"), "/");
    }

    #[test]
    fn test_upstream_url_bare_host() {
        let base = Url::parse("http://up.local").unwrap();
        let url = upstream_url(&base, "/models", Some("x=1"));
        assert_eq!(url.as_str(), "http://up.local/models?x=1");
    }

    #[test]
    fn test_upstream_url_with_base_path() {
        let base = Url::parse("https://my-aoai.openai.azure.com/openai/").unwrap();
        let url = upstream_url(
            &base,
            "/deployments/gpt/chat/completions",
            Some("api-version=2024-06-01"),
        );
        assert_eq!(
            url.as_str(),
            "https://my-aoai.openai.azure.com/openai/deployments/gpt/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn test_upstream_url_replaces_base_query() {
        let base = Url::parse("http://up.local/v1?stale=1#frag").unwrap();
        assert_eq!(
            upstream_url(&base, "/a", None).as_str(),
            "http://up.local/v1/a"
        );
        assert_eq!(
            upstream_url(&base, "/a", Some("")).as_str(),
            "http://up.local/v1/a"
        );
    }

    #[test]
    fn test_upstream_url_keeps_query_verbatim() {
        let base = Url::parse("http://up.local").unwrap();
        let url = upstream_url(&base, "/search", Some("q=a%20b&tag=x&tag=y"));
        assert_eq!(url.query(), Some("q=a%20b&tag=x&tag=y"));
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("/models"), "/models");
        assert_eq!(clean_path("/"), "/");
        assert_eq!(clean_path(""), "/");
        assert_eq!(clean_path("//a///b"), "/a/b");
        assert_eq!(clean_path("/a/./b/../c"), "/a/c");
        assert_eq!(clean_path("/a/b/"), "/a/b/");
        assert_eq!(clean_path("/a/b/.."), "/a/");
        assert_eq!(clean_path("/.."), "/");
    }

    #[test]
    fn test_clean_path_cannot_climb_above_root() {
        assert_eq!(clean_path("/../secret"), "/secret");
        assert_eq!(clean_path("/../../a/../../b"), "/b");
        assert_eq!(clean_path("/%2e%2e/secret"), "/secret");
        assert_eq!(clean_path("/%2E%2e/secret"), "/secret");
        assert_eq!(clean_path("/.%2e/secret"), "/secret");
        assert_eq!(clean_path("/%2e/secret"), "/secret");
        assert_eq!(clean_path("/..\\secret"), "/secret");
    }

    #[test]
    fn test_upstream_url_stays_under_base_path() {
        let base = Url::parse("https://up.local/openai/").unwrap();
        for path in [
            "/../secret",
            "/%2e%2e/secret",
            "/a/../../secret",
            "/%2e%2e/%2e%2e/secret",
            "/..\\secret",
        ] {
            let url = upstream_url(&base, path, None);
            assert_eq!(url.as_str(), "https://up.local/openai/secret", "{path}");
        }
    }

    #[test]
    fn test_upstream_url_encodes_quotes_in_query() {
        let base = Url::parse("http://up.local").unwrap();
        let url = upstream_url(&base, "/q", Some("name='x'&s=\"y\""));
        assert_eq!(url.query(), Some("name=%27x%27&s=%22y%22"));
    }

    #[test]
    fn test_copy_headers_drops_connection_listed() {
        let mut src = HeaderMap::new();
        src.insert("connection", HeaderValue::from_static("X-Hop, keep-alive"));
        src.append("connection", HeaderValue::from_static("x-other"));
        src.insert("x-hop", HeaderValue::from_static("1"));
        src.insert("x-other", HeaderValue::from_static("2"));
        src.insert("x-end-to-end", HeaderValue::from_static("3"));

        let mut dst = HeaderMap::new();
        copy_headers(&src, &mut dst);

        assert!(dst.get("x-hop").is_none());
        assert!(dst.get("x-other").is_none());
        assert!(dst.get("connection").is_none());
        assert_eq!(dst.get("x-end-to-end").unwrap(), "3");
    }

    #[test]
    fn test_copy_headers_exclusions() {
        let mut src = HeaderMap::new();
        src.insert("host", HeaderValue::from_static("proxy.local"));
        src.insert("authorization", HeaderValue::from_static("Bearer client"));
        src.insert("connection", HeaderValue::from_static("keep-alive"));
        src.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        src.insert("content-type", HeaderValue::from_static("application/json"));
        src.append("x-trace", HeaderValue::from_static("1"));
        src.append("x-trace", HeaderValue::from_static("2"));

        let mut dst = HeaderMap::new();
        copy_headers(&src, &mut dst);

        assert!(dst.get("host").is_none());
        assert!(dst.get("authorization").is_none());
        assert!(dst.get("connection").is_none());
        assert!(dst.get("transfer-encoding").is_none());
        assert_eq!(dst.get("content-type").unwrap(), "application/json");
        let traces: Vec<_> = dst.get_all("x-trace").iter().collect();
        assert_eq!(traces, ["1", "2"]);
    }

    #[test]
    fn test_hop_by_hop_list() {
        assert!(HOP_BY_HOP.contains(&"connection"));
        assert!(HOP_BY_HOP.contains(&"transfer-encoding"));
        assert!(!HOP_BY_HOP.contains(&"authorization"));
    }
}
