//! `:name` path templates.
//!
//! A template such as `/users/:id/roles` is split into literal and
//! placeholder segments once; [`PathTemplate::resolve`] then fills the
//! placeholders from a [`Params`] bag and removes the consumed keys so they
//! are not repeated in the query string or body.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::{IdmError, Params, Result};

/// Everything except RFC 3986 unreserved characters is escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder { name: String, required: bool },
}

/// Parsed URL path template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    absolute: bool,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        let source = template.into();
        let absolute = source.starts_with('/');
        let segments = source
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match placeholder_name(segment) {
                Some(name) => Segment::Placeholder {
                    name: name.to_owned(),
                    required: false,
                },
                None => Segment::Literal(segment.to_owned()),
            })
            .collect();

        Self {
            source,
            absolute,
            segments,
        }
    }

    /// Marks a placeholder as mandatory. Unknown names are ignored.
    pub fn require(mut self, name: &str) -> Self {
        for segment in &mut self.segments {
            if let Segment::Placeholder {
                name: placeholder,
                required,
            } = segment
            {
                if placeholder == name {
                    *required = true;
                }
            }
        }
        self
    }

    /// The template text this was parsed from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholder names in template order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitutes placeholders from `params`, left to right.
    ///
    /// Consumed keys are removed from `params`. An absent optional
    /// placeholder drops its whole segment; an absent required one fails
    /// with [`IdmError::MissingParameter`].
    pub fn resolve(&self, params: &mut Params) -> Result<String> {
        let mut parts = Vec::with_capacity(self.segments.len());

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => parts.push(text.clone()),
                Segment::Placeholder { name, required } => {
                    let value = params.remove(name).filter(|value| !value.is_blank());
                    match value {
                        Some(value) => {
                            let rendered = value.render();
                            parts.push(utf8_percent_encode(&rendered, PATH_SEGMENT).to_string());
                        }
                        None if *required => {
                            return Err(IdmError::MissingParameter { name: name.clone() });
                        }
                        None => {}
                    }
                }
            }
        }

        let joined = parts.join("/");
        if self.absolute {
            Ok(format!("/{joined}"))
        } else {
            Ok(joined)
        }
    }
}

impl From<&str> for PathTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

impl From<String> for PathTemplate {
    fn from(template: String) -> Self {
        Self::new(template)
    }
}

fn placeholder_name(segment: &str) -> Option<&str> {
    let name = segment.strip_prefix(':')?;
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_');
    valid.then_some(name)
}

#[cfg(test)]
mod tests {
    use super::PathTemplate;
    use crate::{IdmError, Params, Value};

    #[test]
    fn substitutes_and_consumes_placeholders() {
        let template = PathTemplate::new("/users/:id/roles");
        let mut params = Params::new().with("id", "u1").with("page", 2);

        let path = template.resolve(&mut params).expect("must resolve");

        assert_eq!(path, "/users/u1/roles");
        assert!(params.get("id").is_none());
        assert_eq!(params.get("page"), Some(&Value::Integer(2)));
    }

    #[test]
    fn absent_optional_placeholder_drops_segment() {
        let template = PathTemplate::new("/users/:id");
        let mut params = Params::new();
        assert_eq!(template.resolve(&mut params).unwrap(), "/users");
    }

    #[test]
    fn blank_value_counts_as_absent() {
        let template = PathTemplate::new("/roles/:id/permissions");
        let mut params = Params::new().with("id", "");
        assert_eq!(template.resolve(&mut params).unwrap(), "/roles/permissions");
        assert!(params.is_empty());
    }

    #[test]
    fn required_placeholder_must_be_present() {
        let template = PathTemplate::new("/users/:id").require("id");
        let err = template
            .resolve(&mut Params::new())
            .expect_err("must fail without id");
        assert!(matches!(err, IdmError::MissingParameter { ref name } if name == "id"));
    }

    #[test]
    fn multiple_placeholders_resolve_independently() {
        let template = PathTemplate::new("/organizations/:id/members/:user_id/roles");

        let mut both = Params::new().with("user_id", "u2").with("id", "org1");
        assert_eq!(
            template.resolve(&mut both).unwrap(),
            "/organizations/org1/members/u2/roles"
        );

        let mut first_only = Params::new().with("id", "org1");
        assert_eq!(
            template.resolve(&mut first_only).unwrap(),
            "/organizations/org1/members/roles"
        );
    }

    #[test]
    fn values_are_escaped_as_path_segments() {
        let template = PathTemplate::new("/users/:id");
        let mut params = Params::new().with("id", "auth0|abc/def ghi");
        assert_eq!(
            template.resolve(&mut params).unwrap(),
            "/users/auth0%7Cabc%2Fdef%20ghi"
        );
    }

    #[test]
    fn resolved_path_never_keeps_supplied_placeholder_tokens() {
        let template = PathTemplate::new("/a/:x/b/:y/c/:z");
        let names = ["x", "y", "z"];
        for mask in 0u8..8 {
            let mut params = Params::new();
            for (bit, name) in names.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    params.insert(*name, format!("v{bit}"));
                }
            }
            let path = template.resolve(&mut params).unwrap();
            assert!(!path.contains(':'), "unexpected token in {path}");
            assert!(params.is_empty());
            for (bit, _) in names.iter().enumerate() {
                let supplied = mask & (1 << bit) != 0;
                assert_eq!(path.contains(&format!("v{bit}")), supplied);
            }
        }
    }

    #[test]
    fn placeholders_are_listed_in_order() {
        let template = PathTemplate::new("/connections/:id/users/:email");
        let names: Vec<&str> = template.placeholders().collect();
        assert_eq!(names, ["id", "email"]);
    }

    #[test]
    fn colon_without_name_is_literal() {
        let template = PathTemplate::new("/stats/:/daily");
        assert_eq!(template.resolve(&mut Params::new()).unwrap(), "/stats/:/daily");
    }
}
