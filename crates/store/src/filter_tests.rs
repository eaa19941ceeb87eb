// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

fn doc() -> Value {
    json!({
        "uuid": "372bdb58-7b64-4c3c-9046-5a1a0a1b0d5e",
        "setup": true,
        "status": "running",
        "ram": 65422,
        "expires_at": "2018-01-30T07:11:04.000Z",
        "next_reboot": null
    })
}

#[parameterized(
    eq_string = { Filter::eq("status", "running"), true },
    eq_wrong = { Filter::eq("status", "rebooting"), false },
    eq_bool = { Filter::eq("setup", true), true },
    eq_missing_attr = { Filter::eq("nope", "x"), false },
    ne_matches = { Filter::ne("status", "rebooting"), true },
    ne_missing_attr = { Filter::ne("nope", "x"), true },
    ge_number = { Filter::ge("ram", 65000), true },
    ge_number_fails = { Filter::ge("ram", 66000), false },
    le_number = { Filter::le("ram", 65422), true },
    present_hit = { Filter::present("uuid"), true },
    present_null = { Filter::present("next_reboot"), false },
    present_missing = { Filter::present("nope"), false },
    all = { Filter::True, true },
)]
fn leaf_filters(filter: Filter, expected: bool) {
    assert_eq!(filter.matches(&doc()), expected, "{filter}");
}

#[test]
fn string_comparison_is_lexicographic() {
    // ISO timestamps order correctly as strings.
    let f = Filter::le("expires_at", "2018-02-01T00:00:00.000Z");
    assert!(f.matches(&doc()));
    let f = Filter::ge("expires_at", "2018-02-01T00:00:00.000Z");
    assert!(!f.matches(&doc()));
}

#[test]
fn and_or_not_compose() {
    let f = Filter::and([
        Filter::eq("setup", true),
        Filter::or([Filter::eq("status", "running"), Filter::eq("status", "rebooting")]),
        Filter::not(Filter::present("next_reboot")),
    ]);
    assert!(f.matches(&doc()));
}

#[test]
fn numeric_coercion() {
    assert!(Filter::eq("ram", 65422.0).matches(&doc()));
}

#[test]
fn display_is_ldap_ish() {
    let f = Filter::and([Filter::eq("setup", true), Filter::ge("ram", 1024)]);
    assert_eq!(f.to_string(), "(&(setup=true)(ram>=1024))");
}
