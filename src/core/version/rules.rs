// ─── Rule Evaluation ───
// The upstream rules[] language is a tiny filter algebra. Evaluation is a
// pure function of (rules, host, features); order matters and the last
// matching rule wins.

use std::collections::HashMap;

use crate::core::version::descriptor::{Rule, RuleAction};

/// Host attributes rules are matched against.
#[derive(Debug, Clone)]
pub struct RuleHost {
    /// Mojang OS key: `windows`, `osx`, or `linux`.
    pub os_name: &'static str,
    pub os_version: String,
    /// Target architecture, e.g. `x86_64`, `aarch64`, `x86`.
    pub arch: &'static str,
}

impl RuleHost {
    pub fn current() -> Self {
        Self {
            os_name: current_os_name(),
            os_version: os_version_string(),
            arch: std::env::consts::ARCH,
        }
    }
}

pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

fn os_version_string() -> String {
    // Only the osx 10.5 regex rules ever consult this in practice; an empty
    // string simply never matches a version pattern.
    std::env::var("MERIDIAN_OS_VERSION").unwrap_or_default()
}

/// Evaluate a rule list. An empty list is `allow`; otherwise the starting
/// polarity is `deny` and every matching rule overwrites the state with its
/// action.
pub fn evaluate(rules: &[Rule], host: &RuleHost, features: &HashMap<String, bool>) -> bool {
    if rules.is_empty() {
        return true;
    }

    let mut allowed = false;
    for rule in rules {
        if rule_matches(rule, host, features) {
            allowed = rule.action == RuleAction::Allow;
        }
    }
    allowed
}

/// `true` when every condition the rule states holds on this host.
/// A rule with no conditions matches unconditionally.
fn rule_matches(rule: &Rule, host: &RuleHost, features: &HashMap<String, bool>) -> bool {
    if let Some(os) = &rule.os {
        if let Some(name) = &os.name {
            if name != host.os_name {
                return false;
            }
        }
        if let Some(pattern) = &os.version {
            match regex::Regex::new(pattern) {
                Ok(re) => {
                    if !re.is_match(&host.os_version) {
                        return false;
                    }
                }
                // An unparseable upstream pattern cannot match anything.
                Err(_) => return false,
            }
        }
        if let Some(arch) = &os.arch {
            if arch != host.arch {
                return false;
            }
        }
    }

    if let Some(required) = &rule.features {
        for (feature, expected) in required {
            let actual = features.get(feature).copied().unwrap_or(false);
            if actual != *expected {
                return false;
            }
        }
    }

    true
}

/// Whether any rule is gated on feature flags. Such tokens are kept
/// unevaluated by the resolver and decided at assembly time, where the
/// instance configuration determines the feature set.
pub fn mentions_features(rules: &[Rule]) -> bool {
    rules.iter().any(|rule| rule.features.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::version::descriptor::OsRule;

    fn host(os_name: &'static str) -> RuleHost {
        RuleHost {
            os_name,
            os_version: String::new(),
            arch: "x86_64",
        }
    }

    fn allow_on(os: &str) -> Rule {
        Rule {
            action: RuleAction::Allow,
            os: Some(OsRule {
                name: Some(os.to_string()),
                version: None,
                arch: None,
            }),
            features: None,
        }
    }

    fn disallow_on(os: &str) -> Rule {
        Rule {
            action: RuleAction::Disallow,
            os: Some(OsRule {
                name: Some(os.to_string()),
                version: None,
                arch: None,
            }),
            features: None,
        }
    }

    fn unconditional_allow() -> Rule {
        Rule {
            action: RuleAction::Allow,
            os: None,
            features: None,
        }
    }

    #[test]
    fn empty_rule_list_allows() {
        assert!(evaluate(&[], &host("linux"), &HashMap::new()));
    }

    #[test]
    fn allow_only_on_other_os_denies() {
        assert!(!evaluate(&[allow_on("osx")], &host("linux"), &HashMap::new()));
    }

    #[test]
    fn last_matching_rule_wins() {
        // allow everywhere, then disallow on linux: denied on linux...
        let rules = vec![unconditional_allow(), disallow_on("linux")];
        assert!(!evaluate(&rules, &host("linux"), &HashMap::new()));
        // ...but still allowed on windows.
        assert!(evaluate(&rules, &host("windows"), &HashMap::new()));
    }

    #[test]
    fn feature_rule_requires_flag() {
        let rule = Rule {
            action: RuleAction::Allow,
            os: None,
            features: Some(HashMap::from([("has_custom_resolution".to_string(), true)])),
        };
        let rules = vec![rule];

        assert!(!evaluate(&rules, &host("linux"), &HashMap::new()));

        let features = HashMap::from([("has_custom_resolution".to_string(), true)]);
        assert!(evaluate(&rules, &host("linux"), &features));
        assert!(mentions_features(&rules));
    }

    #[test]
    fn os_version_regex() {
        let rule = Rule {
            action: RuleAction::Allow,
            os: Some(OsRule {
                name: None,
                version: Some("^10\\.".to_string()),
                arch: None,
            }),
            features: None,
        };
        let mut matching = host("osx");
        matching.os_version = "10.15.7".to_string();
        assert!(evaluate(std::slice::from_ref(&rule), &matching, &HashMap::new()));

        let mut other = host("osx");
        other.os_version = "13.2".to_string();
        assert!(!evaluate(&[rule], &other, &HashMap::new()));
    }

    #[test]
    fn arch_condition_is_exact() {
        let rule = Rule {
            action: RuleAction::Allow,
            os: Some(OsRule {
                name: None,
                version: None,
                arch: Some("x86".to_string()),
            }),
            features: None,
        };
        assert!(!evaluate(&[rule], &host("windows"), &HashMap::new()));
    }
}
