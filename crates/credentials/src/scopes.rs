//! OAuth scope sets and the small algebra over them.

/// Gmail scopes requested when a Gmail tool is attached.
pub const GMAIL_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.compose",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
    "https://www.googleapis.com/auth/gmail.addons.current.action.compose",
    "https://www.googleapis.com/auth/gmail.addons.current.message.action",
    "https://mail.google.com/",
];

/// Any one of these lets Gmail send mail or create drafts.
pub const GMAIL_SEND_SCOPES: &[&str] = &[
    "https://mail.google.com/",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.compose",
];

pub const SHEETS_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets.readonly",
    "https://www.googleapis.com/auth/spreadsheets",
];

pub const CALENDAR_SCOPES: &[&str] = &["https://www.googleapis.com/auth/calendar"];

/// Always requested alongside tool scopes so the account can be identified.
pub const PROFILE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "openid",
];

/// Scopes a built-in tool needs, if it talks to Google at all.
pub fn tool_scopes(tool_name: &str) -> Option<&'static [&'static str]> {
    match tool_name {
        "gmail" => Some(GMAIL_SCOPES),
        "google_sheets" => Some(SHEETS_SCOPES),
        "google_calendar" => Some(CALENDAR_SCOPES),
        _ => None,
    }
}

/// The consent set for a selection of tools: each tool's scopes plus the
/// profile scopes, or empty when none of the tools need Google.
pub fn scopes_for_tools<S: AsRef<str>>(tools: &[S]) -> Vec<String> {
    let mut requested: Vec<&str> = tools
        .iter()
        .filter_map(|t| tool_scopes(t.as_ref()))
        .flatten()
        .copied()
        .collect();
    if requested.is_empty() {
        return Vec::new();
    }
    requested.extend_from_slice(PROFILE_SCOPES);
    normalize_scopes(requested)
}

/// Trim, drop blanks, and de-duplicate while keeping first-seen order.
pub fn normalize_scopes<I, S>(scopes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for scope in scopes {
        let scope = scope.as_ref().trim();
        if !scope.is_empty() && !normalized.iter().any(|s| s == scope) {
            normalized.push(scope.to_string());
        }
    }
    normalized
}

/// Parse a space-delimited OAuth `scope` string.
pub fn parse_scope_string(raw: &str) -> Vec<String> {
    normalize_scopes(raw.split_whitespace())
}

/// Union of two grants; the result never drops a scope from `existing`.
pub fn merge_scopes(existing: &[String], granted: &[String]) -> Vec<String> {
    normalize_scopes(existing.iter().chain(granted.iter()))
}

/// Required scopes absent from the granted set, in required order.
pub fn missing_scopes<S: AsRef<str>>(granted: &[String], required: &[S]) -> Vec<String> {
    required
        .iter()
        .map(|r| r.as_ref())
        .filter(|r| !granted.iter().any(|g| g == r))
        .map(str::to_string)
        .collect()
}

/// True when the grant carries at least one of `any_of`.
pub fn has_any_scope(granted: &[String], any_of: &[&str]) -> bool {
    granted.iter().any(|g| any_of.contains(&g.as_str()))
}
