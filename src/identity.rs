/// Derive an article id from its URL: lowercase MD5 hex of the exact string.
///
/// No normalization happens here. `https://a/b` and `https://a/b/` are
/// different articles.
pub fn derive_id(url: &str) -> String {
    format!("{:x}", md5::compute(url.as_bytes()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn stable_across_calls() {
        let url = "https://blog.example.com/2023/05/hello-world";
        assert_eq!(derive_id(url), derive_id(url));
    }

    #[test]
    fn md5_hex_digest() {
        assert_eq!(derive_id(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            derive_id("https://example.com"),
            "c984d06aafbecf6bc55569f964148ea3"
        );
    }

    #[test]
    fn url_is_not_normalized() {
        let base = "https://blog.example.com/post";
        let variants = [
            "https://blog.example.com/post/",
            "https://Blog.example.com/post",
            "https://blog.example.com/post?a=1&b=2",
            "https://blog.example.com/post?b=2&a=1",
        ];
        for v in variants {
            assert_ne!(derive_id(base), derive_id(v), "{v}");
        }
    }

    #[test]
    fn no_collisions_across_corpus() {
        let ids: HashSet<String> = (0..5000)
            .map(|i| derive_id(&format!("https://blog{}.example.com/posts/{}", i % 17, i)))
            .collect();
        assert_eq!(ids.len(), 5000);
        assert!(ids.iter().all(|id| id.len() == 32));
    }
}
