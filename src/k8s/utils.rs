use std::collections::BTreeMap;

pub(crate) fn format_label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<String>>()
        .join(",")
}

// return true if all of selector pairs can be found in the labels
pub(crate) fn select<K, V>(selector: &BTreeMap<K, V>, labels: &BTreeMap<K, V>) -> bool
where
    K: Ord + Eq,
    V: Eq,
{
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_format_label_selector_is_sorted() {
        let selector = labels(&[("tier", "web"), ("app", "echo")]);
        assert_eq!(format_label_selector(&selector), "app=echo,tier=web");
        assert_eq!(format_label_selector(&BTreeMap::new()), "");
    }

    #[test]
    fn test_select_requires_every_pair() {
        let selector = labels(&[("app", "echo")]);
        assert!(select(&selector, &labels(&[("app", "echo"), ("pod-template-hash", "abc")])));
        assert!(!select(&selector, &labels(&[("app", "other")])));
        assert!(!select(&selector, &BTreeMap::new()));
        assert!(select(&BTreeMap::new(), &labels(&[("app", "echo")])));
    }
}
