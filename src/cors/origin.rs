use regex::Regex;

/// A single compiled origin pattern.
#[derive(Debug, Clone)]
pub enum OriginPattern {
    /// The lone `*`: matches every origin, including an absent one.
    Any,
    /// No wildcard: the origin must equal the pattern exactly.
    Exact(String),
    /// Embedded `*` wildcards, anchored on both ends.
    ///
    /// `https://*.example.com` compiles to `^https://.*\.example\.com$`: every
    /// `*` absorbs zero or more characters and everything else is literal.
    Wildcard(Regex),
}

impl OriginPattern {
    /// Compile a pattern string. Never fails: every input yields a matcher.
    pub fn compile(pattern: &str) -> Self {
        if pattern == "*" {
            return OriginPattern::Any;
        }
        if !pattern.contains('*') {
            return OriginPattern::Exact(pattern.to_string());
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        match Regex::new(&format!("^{body}$")) {
            Ok(regex) => OriginPattern::Wildcard(regex),
            // Escaped input only fails on the engine's size limit.
            Err(err) => {
                tracing::warn!("Origin pattern '{}' could not be compiled ({}), matching it literally", pattern, err);
                OriginPattern::Exact(pattern.to_string())
            }
        }
    }

    pub fn matches(&self, origin: &str) -> bool {
        match self {
            OriginPattern::Any => true,
            OriginPattern::Exact(value) => value == origin,
            OriginPattern::Wildcard(regex) => regex.is_match(origin),
        }
    }
}

/// Immutable allow-list of origin patterns, compiled once at startup.
#[derive(Debug, Clone, Default)]
pub struct OriginMatcher {
    patterns: Vec<OriginPattern>,
}

impl OriginMatcher {
    pub fn compile<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .map(|p| OriginPattern::compile(&p))
            .collect();
        Self { patterns }
    }

    /// Whether the request origin is approved. An absent origin passes only `*`.
    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            Some(origin) => self.patterns.iter().any(|p| p.matches(origin)),
            None => self.allows_any(),
        }
    }

    pub fn allows_any(&self) -> bool {
        self.patterns
            .iter()
            .any(|p| matches!(p, OriginPattern::Any))
    }
}
