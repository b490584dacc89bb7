// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tests for the declarative header mapping tables.

use http::{HeaderMap, HeaderName, HeaderValue};
use mha_headers::{HeaderMapping, MappedHeaders, map_headers};
use std::collections::BTreeMap;

fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (k, v) in pairs {
        map.append(
            HeaderName::from_bytes(k.as_bytes()).unwrap(),
            HeaderValue::from_str(v).unwrap(),
        );
    }
    map
}

fn mapping(pairs: &[(&str, &str)]) -> HeaderMapping {
    pairs
        .iter()
        .map(|(h, t)| (HeaderName::from_bytes(h.as_bytes()).unwrap(), t.to_string()))
        .collect()
}

// ── HeaderMapping ───────────────────────────────────────────────────

#[test]
fn mapping_keeps_declaration_order() {
    let m = mapping(&[("X-B", "b"), ("X-A", "a"), ("X-C", "c")]);
    let targets: Vec<&str> = m.iter().map(|(_, t)| t).collect();
    assert_eq!(targets, vec!["b", "a", "c"]);
}

#[test]
fn mapping_insert_replaces_case_insensitively() {
    let mut m = HeaderMapping::new();
    m.insert(HeaderName::from_static("x-team-id"), "team");
    m.insert(HeaderName::from_bytes(b"X-Team-Id").unwrap(), "team-id");
    assert_eq!(m.len(), 1);
    assert_eq!(
        m.get(&HeaderName::from_static("x-team-id")),
        Some("team-id")
    );
}

#[test]
fn mapping_empty_by_default() {
    let m = HeaderMapping::default();
    assert!(m.is_empty());
    assert_eq!(m.len(), 0);
}

// ── map_headers ─────────────────────────────────────────────────────

#[test]
fn env_mapping_single_token() {
    let h = headers(&[("X-Slack-Token", "xoxp-1")]);
    let env = mapping(&[("X-Slack-Token", "SLACK_TOKEN")]);

    let out = map_headers(&h, &env, &HeaderMapping::new());

    let mut expected = BTreeMap::new();
    expected.insert("SLACK_TOKEN".to_string(), "xoxp-1".to_string());
    assert_eq!(out.env, expected);
    assert!(out.args.is_empty());
}

#[test]
fn arg_mapping_produces_adjacent_pairs() {
    let h = headers(&[("X-Team-Id", "T1"), ("X-Channel", "general")]);
    let args = mapping(&[("X-Team-Id", "team-id"), ("X-Channel", "channel")]);

    let out = map_headers(&h, &HeaderMapping::new(), &args);

    assert!(out.env.is_empty());
    assert_eq!(out.args.len(), 4);
    let pairs: Vec<(&str, &str)> = out
        .args
        .chunks(2)
        .map(|c| (c[0].as_str(), c[1].as_str()))
        .collect();
    assert!(pairs.contains(&("--team-id", "T1")));
    assert!(pairs.contains(&("--channel", "general")));
}

#[test]
fn arg_mapping_follows_declaration_order() {
    let h = headers(&[("X-Channel", "general"), ("X-Team-Id", "T1")]);
    let args = mapping(&[("X-Team-Id", "team-id"), ("X-Channel", "channel")]);

    let out = map_headers(&h, &HeaderMapping::new(), &args);

    assert_eq!(out.args, vec!["--team-id", "T1", "--channel", "general"]);
}

#[test]
fn header_lookup_is_case_insensitive() {
    let h = headers(&[("x-slack-token", "lower")]);
    let env = mapping(&[("X-SLACK-TOKEN", "SLACK_TOKEN")]);

    let out = map_headers(&h, &env, &HeaderMapping::new());
    assert_eq!(out.env["SLACK_TOKEN"], "lower");
}

#[test]
fn absent_and_empty_headers_are_omitted() {
    let h = headers(&[("X-Empty", "")]);
    let env = mapping(&[("X-Empty", "EMPTY"), ("X-Missing", "MISSING")]);
    let args = mapping(&[("X-Empty", "empty"), ("X-Missing", "missing")]);

    let out = map_headers(&h, &env, &args);
    assert!(out.is_empty());
}

#[test]
fn unmapped_headers_are_ignored() {
    let h = headers(&[("Authorization", "Bearer x"), ("Content-Type", "application/json")]);
    let env = mapping(&[("X-Slack-Token", "SLACK_TOKEN")]);

    let out = map_headers(&h, &env, &HeaderMapping::new());
    assert_eq!(out, MappedHeaders::default());
}

#[test]
fn empty_tables_yield_empty_result() {
    let h = headers(&[("X-Slack-Token", "xoxp-1")]);
    let out = map_headers(&h, &HeaderMapping::new(), &HeaderMapping::new());
    assert!(out.is_empty());
}

#[test]
fn repeated_header_uses_first_value() {
    let h = headers(&[("X-Team-Id", "first"), ("X-Team-Id", "second")]);
    let env = mapping(&[("X-Team-Id", "TEAM")]);

    let out = map_headers(&h, &env, &HeaderMapping::new());
    assert_eq!(out.env["TEAM"], "first");
}

#[test]
fn value_that_looks_like_a_flag_stays_one_argument() {
    let h = headers(&[("X-Channel", "--delete-everything now")]);
    let args = mapping(&[("X-Channel", "channel")]);

    let out = map_headers(&h, &HeaderMapping::new(), &args);
    assert_eq!(out.args, vec!["--channel", "--delete-everything now"]);
}

#[test]
fn one_header_can_feed_env_and_args() {
    let h = headers(&[("X-Team-Id", "T9")]);
    let env = mapping(&[("X-Team-Id", "TEAM_ID")]);
    let args = mapping(&[("X-Team-Id", "team-id")]);

    let out = map_headers(&h, &env, &args);
    assert_eq!(out.env["TEAM_ID"], "T9");
    assert_eq!(out.args, vec!["--team-id", "T9"]);
}
