use std::collections::HashMap;

/// Header names matched without regard to ASCII case.
///
/// Hospital exports are inconsistent about header case (`PatNo`, `PATNO`),
/// so configured column names are resolved against the actual headers
/// through this set. The first spelling seen wins.
#[derive(Debug, Clone)]
pub struct CaseInsensitiveSet {
    map: HashMap<String, String>,
}

impl CaseInsensitiveSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = HashMap::new();
        for name in names {
            let name = name.as_ref();
            let key = name.trim().to_ascii_uppercase();
            map.entry(key).or_insert_with(|| name.to_string());
        }
        Self { map }
    }

    /// Returns the header as spelled in the source.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map
            .get(&name.trim().to_ascii_uppercase())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(&name.trim().to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_original_spelling() {
        let set = CaseInsensitiveSet::new(["PatNo", "SEX", "patno"]);
        assert_eq!(set.get("PATNO"), Some("PatNo"));
        assert_eq!(set.get(" sex "), Some("SEX"));
        assert!(!set.contains("BIRTH"));
        assert_eq!(set.len(), 2);
    }
}
