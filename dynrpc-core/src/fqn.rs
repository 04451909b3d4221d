//! # Method Name Resolution
//!
//! Users rarely type a fully qualified method name. This module expands partial references
//! (`Method`, `Service.Method`) into the canonical `package.Service.Method` form using the
//! configured default package and service, and performs the inverse operation for completion:
//! rendering fully qualified symbols relative to those defaults and filtering them by what the
//! user has typed so far.
//!
//! Package names may contain any number of dots, so a name is always split from the right:
//! the last component is the method, the one before it the service, and everything else the
//! package.
use std::collections::HashSet;
use std::fmt;

/// A `{package, service, method}` triple parsed from a dotted name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodName {
    pub package: String,
    pub service: String,
    pub method: String,
}

impl MethodName {
    /// Splits a dotted name into its components.
    ///
    /// * 1 component: method only.
    /// * 2 components: service and method.
    /// * 3 or more: the last two are service and method, the rest is the package.
    pub fn parse(raw: &str) -> Self {
        let parts: Vec<&str> = raw.split('.').collect();

        match parts.as_slice() {
            [method] => Self {
                method: method.to_string(),
                ..Default::default()
            },
            [service, method] => Self {
                service: service.to_string(),
                method: method.to_string(),
                ..Default::default()
            },
            [package @ .., service, method] => Self {
                package: package.join("."),
                service: service.to_string(),
                method: method.to_string(),
            },
            [] => Self::default(),
        }
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.package, self.service, self.method)
    }
}

/// Expands a partial method reference into `package.Service.Method`.
///
/// Empty input yields an empty string, meaning no method was supplied.
/// Components present in `raw` always win over the defaults.
///
/// ```
/// use dynrpc_core::fqn::resolve;
///
/// assert_eq!(resolve("Method", "pkg", "Svc"), "pkg.Svc.Method");
/// assert_eq!(resolve("pkg.v1.Svc.Method", "x", "y"), "pkg.v1.Svc.Method");
/// assert_eq!(resolve("", "pkg", "Svc"), "");
/// ```
pub fn resolve(raw: &str, default_package: &str, default_service: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut name = MethodName::parse(raw);

    if name.package.is_empty() {
        name.package = default_package.to_string();
    }
    if name.service.is_empty() {
        name.service = default_service.to_string();
    }

    name.to_string()
}

/// Configured defaults used to shorten completion candidates.
///
/// `service` may be a bare service name or a fully qualified one (`pkg.Service`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Defaults<'a> {
    pub package: &'a str,
    pub service: &'a str,
}

/// Filters fully qualified method symbols for completion.
///
/// Each symbol with at least three components is rendered relative to `defaults`:
/// a package equal to the default package is omitted, and likewise for the service.
/// A dotted default service strips both package and service, and only when both match.
/// Symbols whose package or service contradict a non-empty default are dropped.
///
/// The remaining candidates are matched against `prefix` (see [`matches`]) and deduplicated,
/// keeping the first occurrence.
pub fn filter_symbols(symbols: &[String], prefix: &str, defaults: Defaults<'_>) -> Vec<String> {
    filter_rendered(symbols, prefix, |symbol| render_method(symbol, defaults))
}

/// Filters the distinct packages of the given method symbols.
pub fn filter_packages(symbols: &[String], prefix: &str) -> Vec<String> {
    filter_rendered(symbols, prefix, |symbol| {
        split_method(symbol).map(|name| name.package)
    })
}

/// Filters the distinct services of the given method symbols.
///
/// Services inside `default_package` are rendered without their package, services of other
/// packages are left fully qualified.
pub fn filter_services(symbols: &[String], prefix: &str, default_package: &str) -> Vec<String> {
    filter_rendered(symbols, prefix, |symbol| {
        let name = split_method(symbol)?;
        if !default_package.is_empty() && name.package == default_package {
            Some(name.service)
        } else {
            Some(format!("{}.{}", name.package, name.service))
        }
    })
}

/// Returns whether `candidate` matches the typed `prefix`.
///
/// Matching is a substring match. It ignores case only when `prefix` is entirely lowercase,
/// so typing any uppercase letter asks for an exact-case match.
pub fn matches(candidate: &str, prefix: &str) -> bool {
    if prefix.to_lowercase() == prefix {
        candidate.to_lowercase().contains(prefix)
    } else {
        candidate.contains(prefix)
    }
}

fn filter_rendered<F>(symbols: &[String], prefix: &str, render: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut seen = HashSet::new();

    symbols
        .iter()
        .filter_map(|symbol| render(symbol))
        .filter(|candidate| !candidate.is_empty() && matches(candidate, prefix))
        .filter(|candidate| seen.insert(candidate.clone()))
        .collect()
}

/// Parses a symbol only if it carries package, service and method.
fn split_method(symbol: &str) -> Option<MethodName> {
    if symbol.split('.').count() < 3 {
        return None;
    }
    Some(MethodName::parse(symbol))
}

fn render_method(symbol: &str, defaults: Defaults<'_>) -> Option<String> {
    let name = split_method(symbol)?;

    let mut keep_package = true;
    if !defaults.package.is_empty() {
        if name.package != defaults.package {
            return None;
        }
        keep_package = false;
    }

    let mut keep_service = true;
    if !defaults.service.is_empty() {
        match defaults.service.rsplit_once('.') {
            Some((package, service)) => {
                if name.package != package || name.service != service {
                    return None;
                }
                keep_package = false;
            }
            None if name.service != defaults.service => return None,
            None => {}
        }
        keep_service = false;
    }

    let mut parts = Vec::with_capacity(3);
    if keep_package {
        parts.push(name.package.as_str());
    }
    if keep_service {
        parts.push(name.service.as_str());
    }
    parts.push(name.method.as_str());

    Some(parts.join("."))
}

#[cfg(test)]
mod test {
    use super::*;

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_precedence() {
        assert_eq!(
            MethodName::parse("Method"),
            MethodName {
                method: "Method".into(),
                ..Default::default()
            }
        );
        assert_eq!(
            MethodName::parse("Svc.Method"),
            MethodName {
                service: "Svc".into(),
                method: "Method".into(),
                ..Default::default()
            }
        );
        assert_eq!(
            MethodName::parse("pkg.v1.Svc.Method"),
            MethodName {
                package: "pkg.v1".into(),
                service: "Svc".into(),
                method: "Method".into(),
            }
        );
    }

    #[test]
    fn test_resolve_substitutes_defaults() {
        assert_eq!(resolve("Method", "pkg", "Svc"), "pkg.Svc.Method");
        assert_eq!(resolve("Svc.Method", "pkg", "Svc"), "pkg.Svc.Method");
        assert_eq!(resolve("Other.Method", "pkg", "Svc"), "pkg.Other.Method");
        assert_eq!(resolve("pkg.v1.Svc.Method", "x", "y"), "pkg.v1.Svc.Method");
    }

    #[test]
    fn test_resolve_empty_is_noop() {
        assert_eq!(resolve("", "pkg", "Svc"), "");
        assert_eq!(resolve("", "", ""), "");
    }

    #[test]
    fn test_resolve_always_yields_three_components() {
        for raw in ["a", "a.b", "a.b.c", "a.b.c.d.e", "a..b"] {
            let resolved = resolve(raw, "", "");
            assert!(resolved.split('.').count() >= 3, "{raw} -> {resolved}");
            let name = MethodName::parse(&resolved);
            assert_eq!(name.to_string(), resolved);
        }
    }

    #[test]
    fn test_filter_excludes_package_mismatch() {
        let defaults = Defaults {
            package: "pkg",
            service: "",
        };

        assert!(filter_symbols(&symbols(&["other.Svc.Method"]), "", defaults).is_empty());
        assert_eq!(
            filter_symbols(&symbols(&["pkg.Svc.Method"]), "", defaults),
            vec!["Svc.Method"]
        );
    }

    #[test]
    fn test_filter_strips_package_and_service() {
        let defaults = Defaults {
            package: "pkg",
            service: "Svc",
        };
        let all = symbols(&["pkg.Svc.Get", "pkg.Other.Get", "pkg.Svc.List"]);

        assert_eq!(filter_symbols(&all, "", defaults), vec!["Get", "List"]);
    }

    #[test]
    fn test_filter_dotted_service_requires_both_parts() {
        let defaults = Defaults {
            package: "",
            service: "pkg.Svc",
        };
        let all = symbols(&["pkg.Svc.Get", "other.Svc.Put", "pkg.Other.List"]);

        assert_eq!(filter_symbols(&all, "", defaults), vec!["Get"]);
    }

    #[test]
    fn test_filter_skips_short_symbols() {
        let all = symbols(&["Svc.Method", "Method", "pkg.Svc.Method"]);
        assert_eq!(
            filter_symbols(&all, "", Defaults::default()),
            vec!["pkg.Svc.Method"]
        );
    }

    #[test]
    fn test_filter_case_rule_is_asymmetric() {
        let all = symbols(&[
            "grpc.reflection.v1.ServerReflection.ServerReflectionInfo",
            "echo.EchoService.UnaryEcho",
        ]);

        assert_eq!(
            filter_symbols(&all, "err", Defaults::default()),
            vec!["grpc.reflection.v1.ServerReflection.ServerReflectionInfo"]
        );
        assert_eq!(
            filter_symbols(&all, "unary", Defaults::default()),
            vec!["echo.EchoService.UnaryEcho"]
        );
        assert!(filter_symbols(&all, "ECHO", Defaults::default()).is_empty());
        assert_eq!(
            filter_symbols(&all, "Echo", Defaults::default()),
            vec!["echo.EchoService.UnaryEcho"]
        );
    }

    #[test]
    fn test_filter_deduplicates_keeping_first() {
        let defaults = Defaults {
            package: "",
            service: "Svc",
        };
        let all = symbols(&["b.Svc.Get", "a.Svc.Get", "a.Svc.Put"]);

        assert_eq!(
            filter_symbols(&all, "", defaults),
            vec!["b.Get", "a.Get", "a.Put"]
        );

        let defaults = Defaults {
            package: "a",
            service: "Svc",
        };
        let all = symbols(&["a.Svc.Get", "a.Svc.Get", "a.Svc.Put"]);
        assert_eq!(filter_symbols(&all, "", defaults), vec!["Get", "Put"]);
    }

    #[test]
    fn test_filter_packages_and_services() {
        let all = symbols(&[
            "echo.EchoService.UnaryEcho",
            "echo.EchoService.BidirectionalEcho",
            "grpc.reflection.v1.ServerReflection.ServerReflectionInfo",
        ]);

        assert_eq!(filter_packages(&all, ""), vec!["echo", "grpc.reflection.v1"]);
        assert_eq!(filter_packages(&all, "refl"), vec!["grpc.reflection.v1"]);
        assert_eq!(
            filter_services(&all, "", "echo"),
            vec!["EchoService", "grpc.reflection.v1.ServerReflection"]
        );
    }
}
