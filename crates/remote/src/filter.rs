//! Allow-list filtering of remote tools.
//!
//! Names compare case-insensitively and must otherwise match exactly. A few
//! family aliases ("calculator", "web") expand to the concrete tools a
//! server offers. None of this affects dispatch, which always uses the
//! tool's exact name.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

const CALCULATOR_ALIASES: &[&str] = &["calculator", "calculators", "math", "arithmetic"];
const CALCULATOR_TOOLS: &[&str] = &[
    "add",
    "subtract",
    "multiply",
    "divide",
    "power",
    "sqrt",
    "factorial",
    "percentage",
];
const WEB_FETCH_ALIASES: &[&str] = &["web_fetch", "webfetch", "web", "fetch", "fetch_web"];
const WEB_FETCH_TOOL: &str = "fetch_web_content";

/// Minimal view of a tool for filtering.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub name: &'a str,
    pub metadata: &'a Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolFilter {
    pub names: BTreeSet<String>,
    pub categories: BTreeSet<String>,
}

fn normalise<I, S>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Category labels found in a tool's metadata.
///
/// Looks at `categories`/`category` at the top level and under
/// `annotations` and `_meta`; each may be a string or a list of strings.
pub fn categories_of(metadata: &Value) -> Vec<String> {
    let scopes = [
        Some(metadata),
        metadata.get("annotations"),
        metadata.get("_meta"),
    ];
    let mut found = Vec::new();
    for scope in scopes.into_iter().flatten() {
        for key in ["categories", "category"] {
            match scope.get(key) {
                Some(Value::String(s)) => found.push(s.trim().to_lowercase()),
                Some(Value::Array(items)) => found.extend(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|s| s.trim().to_lowercase()),
                ),
                _ => {}
            }
        }
    }
    found.retain(|c| !c.is_empty());
    found
}

/// Alias → concrete tool names, limited to what is actually available.
pub fn name_aliases<'a, I>(available: I) -> BTreeMap<String, BTreeSet<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: BTreeSet<String> = normalise(available);
    let mut aliases: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    let calculators: BTreeSet<String> = CALCULATOR_TOOLS
        .iter()
        .filter(|t| names.contains(**t))
        .map(|t| t.to_string())
        .collect();
    if !calculators.is_empty() {
        for alias in CALCULATOR_ALIASES {
            aliases.insert(alias.to_string(), calculators.clone());
        }
    }

    if names.contains(WEB_FETCH_TOOL) {
        for alias in WEB_FETCH_ALIASES {
            aliases
                .entry(alias.to_string())
                .or_default()
                .insert(WEB_FETCH_TOOL.to_string());
        }
    }
    aliases
}

impl ToolFilter {
    pub fn new<N, C, S, T>(names: N, categories: C) -> Self
    where
        N: IntoIterator<Item = S>,
        S: AsRef<str>,
        C: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            names: normalise(names),
            categories: normalise(categories),
        }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: normalise(names),
            categories: BTreeSet::new(),
        }
    }

    /// True when the filter lets everything through.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.categories.is_empty()
    }

    fn requested_matches(
        requested: &str,
        name: &str,
        aliases: &BTreeMap<String, BTreeSet<String>>,
    ) -> bool {
        requested == name || aliases.get(requested).is_some_and(|set| set.contains(name))
    }

    /// Indices of the candidates that pass, in their original order.
    pub fn select(&self, candidates: &[Candidate<'_>]) -> Vec<usize> {
        if self.is_empty() {
            return (0..candidates.len()).collect();
        }
        let aliases = name_aliases(candidates.iter().map(|c| c.name));

        candidates
            .iter()
            .enumerate()
            .filter(|(_, candidate)| {
                let name = candidate.name.trim().to_lowercase();
                let name_match = self.names.is_empty()
                    || (!name.is_empty()
                        && self
                            .names
                            .iter()
                            .any(|requested| Self::requested_matches(requested, &name, &aliases)));
                let category_match = self.categories.is_empty()
                    || categories_of(candidate.metadata)
                        .iter()
                        .any(|c| self.categories.contains(c));
                name_match && category_match
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Requested names that matched none of `selected`, sorted.
    pub fn missing<'a, I>(&self, selected: I, available: &[Candidate<'_>]) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let aliases = name_aliases(available.iter().map(|c| c.name));
        let selected: Vec<String> = selected
            .into_iter()
            .map(|n| n.trim().to_lowercase())
            .collect();
        self.names
            .iter()
            .filter(|requested| {
                !selected
                    .iter()
                    .any(|name| Self::requested_matches(requested, name, &aliases))
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidates<'a>(names: &'a [&'a str], metadata: &'a Value) -> Vec<Candidate<'a>> {
        names
            .iter()
            .map(|name| Candidate { name: *name, metadata })
            .collect()
    }

    #[test]
    fn empty_filter_passes_everything() {
        let none = Value::Null;
        let tools = candidates(&["a", "b"], &none);
        assert_eq!(ToolFilter::default().select(&tools), vec![0, 1]);
    }

    #[test]
    fn allow_list_keeps_only_named_tools() {
        let none = Value::Null;
        let tools = candidates(&["send_mail", "read_mail"], &none);
        let filter = ToolFilter::from_names(["send_mail"]);
        assert_eq!(filter.select(&tools), vec![0]);
    }

    #[test]
    fn names_are_case_insensitive() {
        let none = Value::Null;
        let tools = candidates(&["Search_Docs", "list_files"], &none);
        assert_eq!(ToolFilter::from_names([" SEARCH_docs "]).select(&tools), vec![0]);
    }

    #[test]
    fn partial_names_do_not_match() {
        let none = Value::Null;
        let tools = candidates(&["send_mail", "send_mail_bulk", "add", "address_book_delete"], &none);
        let filter = ToolFilter::from_names(["send_mail", "add"]);
        assert_eq!(filter.select(&tools), vec![0, 2]);

        let only_prefix = ToolFilter::from_names(["search"]);
        let docs = candidates(&["search_docs"], &none);
        assert!(only_prefix.select(&docs).is_empty());
        assert_eq!(only_prefix.missing(Vec::<&str>::new(), &docs), vec!["search".to_string()]);
    }

    #[test]
    fn calculator_alias_expands_to_available_math_tools() {
        let none = Value::Null;
        let tools = candidates(&["add", "sqrt", "weather"], &none);
        let filter = ToolFilter::from_names(["calculator"]);
        assert_eq!(filter.select(&tools), vec![0, 1]);

        let aliases = name_aliases(["add", "sqrt", "weather"]);
        assert_eq!(aliases["math"].len(), 2);
        assert!(!aliases.contains_key("web"));
    }

    #[test]
    fn web_alias_maps_to_fetch_tool() {
        let none = Value::Null;
        let tools = candidates(&["fetch_web_content", "add"], &none);
        assert_eq!(ToolFilter::from_names(["webfetch"]).select(&tools), vec![0]);
    }

    #[test]
    fn categories_come_from_annotations_or_meta() {
        let math = json!({"annotations": {"category": "Math"}});
        let web = json!({"_meta": {"categories": ["web", "io"]}});
        let tools = vec![
            Candidate { name: "add", metadata: &math },
            Candidate { name: "fetch", metadata: &web },
        ];
        let filter = ToolFilter::new(Vec::<String>::new(), ["IO"]);
        assert_eq!(filter.select(&tools), vec![1]);
        assert_eq!(categories_of(&math), vec!["math".to_string()]);
    }

    #[test]
    fn name_and_category_must_both_match() {
        let math = json!({"annotations": {"category": "math"}});
        let tools = vec![Candidate { name: "add", metadata: &math }];
        assert!(ToolFilter::new(["add"], ["web"]).select(&tools).is_empty());
        assert_eq!(ToolFilter::new(["add"], ["math"]).select(&tools), vec![0]);
    }

    #[test]
    fn reports_missing_requests() {
        let none = Value::Null;
        let tools = candidates(&["add", "subtract"], &none);
        let filter = ToolFilter::from_names(["calculator", "translate"]);
        let missing = filter.missing(["add", "subtract"], &tools);
        assert_eq!(missing, vec!["translate".to_string()]);
    }
}
