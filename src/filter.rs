//! Stateless request classification: attack signatures in the URL, scraper
//! user agents, and method/content-type allow-lists.
//!
//! The pattern list is a deny-list heuristic and will miss things. It is a
//! first filter in front of handler-level input validation, not a replacement
//! for it.

use lazy_static::lazy_static;
use regex::Regex;

// whitespace as it shows up in a raw query string
const SEP: &str = r"(?:\s|\+|%20|%09)+";

lazy_static! {
    static ref ATTACK_PATTERNS: Vec<(&'static str, Regex)> = {
        let sql = |body: &str| format!("(?i){}", body.replace("{SEP}", SEP));
        vec![
            ("path_traversal", Regex::new(r"\.\.[/\\]").unwrap()),
            ("script_tag", Regex::new(r"(?i)<\s*script\b").unwrap()),
            ("script_uri", Regex::new(r"(?i)(?:java|vb)script:").unwrap()),
            ("data_uri_base64", Regex::new(r"(?i)data:[a-z0-9.+/-]*;base64,").unwrap()),
            ("encoded_markup", Regex::new(r"(?i)%3c|%3e|%22|%27").unwrap()),
            ("sql_union_select", Regex::new(&sql(r"union{SEP}(?:all{SEP})?select")).unwrap()),
            ("sql_select_from", Regex::new(&sql(r"select{SEP}.+{SEP}from")).unwrap()),
            ("sql_drop_table", Regex::new(&sql(r"drop{SEP}table")).unwrap()),
            ("sql_insert_into", Regex::new(&sql(r"insert{SEP}into")).unwrap()),
            ("sql_delete_from", Regex::new(&sql(r"delete{SEP}from")).unwrap()),
        ]
    };
}

/// Generic HTTP clients and scraper signatures.
const SUSPICIOUS_AGENTS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "scraper",
    "curl",
    "wget",
    "python-requests",
    "python-urllib",
    "aiohttp",
    "httpclient",
    "go-http-client",
    "java/",
    "okhttp",
    "libwww-perl",
    "scrapy",
    "headlesschrome",
    "phantomjs",
];

/// Search engines and link-preview fetchers. Wins over the block list.
const ALLOWED_AGENTS: &[&str] = &[
    "googlebot",
    "bingbot",
    "slurp",
    "duckduckbot",
    "baiduspider",
    "yandexbot",
    "applebot",
    "facebookexternalhit",
    "twitterbot",
    "linkedinbot",
    "slackbot",
    "discordbot",
    "whatsapp",
    "telegrambot",
];

const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "OPTIONS", "HEAD"];

const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/json",
    "application/x-www-form-urlencoded",
    "multipart/form-data",
    "text/plain",
];

pub fn is_disallowed_bot(user_agent: &str) -> bool {
    let ua = user_agent.to_lowercase();
    SUSPICIOUS_AGENTS.iter().any(|token| ua.contains(token))
        && !ALLOWED_AGENTS.iter().any(|token| ua.contains(token))
}

/// Name of the first attack signature found in `path_and_query`, if any.
pub fn attack_pattern(path_and_query: &str) -> Option<&'static str> {
    ATTACK_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(path_and_query))
        .map(|(name, _)| *name)
}

// the gate calls attack_pattern directly so it can log which one hit
#[cfg(test)]
pub fn matches_attack_pattern(path_and_query: &str) -> bool {
    attack_pattern(path_and_query).is_some()
}

pub fn is_allowed_method(method: &str) -> bool {
    ALLOWED_METHODS.contains(&method)
}

pub fn is_mutating_method(method: &str) -> bool {
    matches!(method, "POST" | "PUT" | "PATCH")
}

/// Absent content type is fine; a present one must name an accepted format.
pub fn is_allowed_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(value) => {
            let value = value.to_lowercase();
            ALLOWED_CONTENT_TYPES.iter().any(|allowed| value.contains(allowed))
        }
    }
}
