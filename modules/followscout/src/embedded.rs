// Readers for the `window._sharedData = {...};` block that profile and
// content pages embed in their markup.

use std::sync::LazyLock;

use graph_client::{EdgeConnection, UserNode};
use regex::Regex;
use serde_json::Value;

static SHARED_DATA_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"window\._sharedData\s*=\s*").expect("valid regex"));

/// Parse the embedded shared-data object. Anything after the first complete
/// JSON value (the trailing `;</script>`) is ignored.
pub fn shared_data(html: &str) -> Option<Value> {
    let start = SHARED_DATA_START.find(html)?.end();
    serde_json::Deserializer::from_str(&html[start..])
        .into_iter::<Value>()
        .next()?
        .ok()
        .filter(Value::is_object)
}

/// Liked-by members embedded in a content page, if the page carries them.
pub fn embedded_likers(html: &str) -> Option<Vec<UserNode>> {
    let data = shared_data(html)?;
    let media = data.pointer("/entry_data/PostPage/0/graphql/shortcode_media")?;
    ["edge_liked_by", "edge_media_preview_like"]
        .iter()
        .filter_map(|key| media.get(*key))
        .find_map(|raw| serde_json::from_value::<EdgeConnection>(raw.clone()).ok())
        .map(EdgeConnection::into_members)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST_PAGE: &str = r#"<html><script type="text/javascript">window._sharedData = {"entry_data":{"PostPage":[{"graphql":{"shortcode_media":{"shortcode":"ABC","edge_liked_by":{"count":2,"edges":[{"node":{"id":"11","username":"one"}},{"node":{"id":"12","username":"two","is_private":true}}]}}}}]}};</script></html>"#;

    #[test]
    fn parses_shared_data_and_ignores_trailer() {
        let data = shared_data(POST_PAGE).unwrap();
        assert_eq!(
            data.pointer("/entry_data/PostPage/0/graphql/shortcode_media/shortcode"),
            Some(&Value::String("ABC".into()))
        );
    }

    #[test]
    fn reads_embedded_likers() {
        let likers = embedded_likers(POST_PAGE).unwrap();
        let names: Vec<&str> = likers.iter().map(|n| n.username.as_str()).collect();
        assert_eq!(names, vec!["one", "two"]);
        assert!(likers[1].is_private);
    }

    #[test]
    fn missing_or_broken_block_is_none() {
        assert!(shared_data("<html></html>").is_none());
        assert!(shared_data("window._sharedData = {\"a\": ;").is_none());
        assert!(embedded_likers(r#"window._sharedData = {"entry_data":{}};"#).is_none());
    }
}
