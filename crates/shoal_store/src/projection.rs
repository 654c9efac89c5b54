// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Field projection applied to documents after they leave the cache.
//!
//! A [`Projection`] either includes a fixed set of fields (everything else
//! is dropped) or excludes a fixed set (everything else is kept). The two
//! modes cannot be mixed, and a projection naming no fields is rejected;
//! both rules are enforced when the projection is constructed, never at
//! application time.

use serde_json::Value;

use crate::Document;

/// Validation failures for projection specifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    /// The specification named no fields.
    #[error("projection must name at least one field")]
    Empty,

    /// The specification mixed included and excluded fields.
    #[error("cannot combine include and exclude in one projection")]
    Mixed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Include,
    Exclude,
}

/// A validated field selection.
///
/// Construct one with [`include`](Projection::include),
/// [`exclude`](Projection::exclude), or [`from_spec`](Projection::from_spec)
/// for the `{field: 1|0}` document form, then apply it to as many documents
/// as needed. Applying never mutates the input.
///
/// # Examples
///
/// ```
/// use shoal_store::{doc, Projection};
///
/// let document = doc! { "_id": "1", "name": "ada", "secret": "x" };
///
/// let public = Projection::exclude(["secret"])?;
/// assert_eq!(public.apply(&document), doc! { "_id": "1", "name": "ada" });
///
/// let name_only = Projection::include(["name"])?;
/// assert_eq!(name_only.apply(&document), doc! { "name": "ada" });
/// # Ok::<(), shoal_store::ProjectionError>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Projection {
    mode: Mode,
    fields: Vec<String>,
}

impl Projection {
    /// Creates a projection that keeps only the named fields.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Empty`] when `fields` names nothing.
    pub fn include<I, S>(fields: I) -> Result<Self, ProjectionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_mode(Mode::Include, fields)
    }

    /// Creates a projection that removes the named fields.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Empty`] when `fields` names nothing.
    pub fn exclude<I, S>(fields: I) -> Result<Self, ProjectionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_mode(Mode::Exclude, fields)
    }

    /// Creates a projection from a `{field: 1|0}` specification document.
    ///
    /// A field mapped to `1` (or any other truthy value) is included; a
    /// field mapped to `0`, `false`, or `null` is excluded. Every field must
    /// agree on the mode.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Empty`] for an empty specification and
    /// [`ProjectionError::Mixed`] when inclusion and exclusion are combined.
    ///
    /// # Examples
    ///
    /// ```
    /// use shoal_store::{doc, Projection, ProjectionError};
    ///
    /// let projection = Projection::from_spec(&doc! { "name": 1, "role": 1 })?;
    /// assert_eq!(projection, Projection::include(["name", "role"])?);
    ///
    /// assert_eq!(Projection::from_spec(&doc! {}), Err(ProjectionError::Empty));
    /// assert_eq!(
    ///     Projection::from_spec(&doc! { "a": 1, "b": 0 }),
    ///     Err(ProjectionError::Mixed),
    /// );
    /// # Ok::<(), shoal_store::ProjectionError>(())
    /// ```
    pub fn from_spec(spec: &Document) -> Result<Self, ProjectionError> {
        let mut entries = spec.iter();
        let Some((first_field, first_value)) = entries.next() else {
            return Err(ProjectionError::Empty);
        };

        let include = included(first_value);
        let mut fields = vec![first_field.clone()];
        for (field, value) in entries {
            if included(value) != include {
                return Err(ProjectionError::Mixed);
            }
            fields.push(field.clone());
        }

        let mode = if include { Mode::Include } else { Mode::Exclude };
        Ok(Self { mode, fields })
    }

    fn with_mode<I, S>(mode: Mode, fields: I) -> Result<Self, ProjectionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(ProjectionError::Empty);
        }
        Ok(Self { mode, fields })
    }

    /// Applies the projection, producing a filtered copy of `document`.
    ///
    /// Include mode copies each named field that is present in the source;
    /// fields absent from the source are silently omitted rather than set to
    /// null. Exclude mode shallow-copies the source and removes the named
    /// fields. The source document is never modified.
    #[must_use]
    pub fn apply(&self, document: &Document) -> Document {
        match self.mode {
            Mode::Include => {
                let mut result = Document::new();
                for field in &self.fields {
                    if let Some(value) = document.get(field) {
                        result.insert(field.clone(), value.clone());
                    }
                }
                result
            }
            Mode::Exclude => {
                let mut result = document.clone();
                for field in &self.fields {
                    result.remove(field);
                }
                result
            }
        }
    }

    /// Returns the fields this projection names.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns `true` for an include-mode projection.
    #[must_use]
    pub fn is_include(&self) -> bool {
        self.mode == Mode::Include
    }
}

/// JSON truthiness for projection flags: `0`, `false`, and `null` exclude.
fn included(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::Null => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn include_copies_exactly_the_listed_fields() {
        let document = doc! { "a": 1, "b": 2, "c": 3 };
        let projection = Projection::include(["a", "c"]).expect("valid projection");

        assert_eq!(projection.apply(&document), doc! { "a": 1, "c": 3 });
    }

    #[test]
    fn include_omits_fields_absent_from_the_source() {
        let document = doc! { "a": 1 };
        let projection = Projection::include(["a", "missing"]).expect("valid projection");

        let result = projection.apply(&document);
        assert_eq!(result, doc! { "a": 1 });
        assert!(!result.contains_key("missing"));
    }

    #[test]
    fn include_copies_explicit_null_values() {
        let document = doc! { "a": null, "b": 2 };
        let projection = Projection::include(["a"]).expect("valid projection");

        assert_eq!(projection.apply(&document), doc! { "a": null });
    }

    #[test]
    fn exclude_equals_source_minus_the_listed_fields() {
        let document = doc! { "a": 1, "b": 2, "c": 3 };
        let projection = Projection::exclude(["b"]).expect("valid projection");

        assert_eq!(projection.apply(&document), doc! { "a": 1, "c": 3 });
    }

    #[test]
    fn exclude_tolerates_fields_absent_from_the_source() {
        let document = doc! { "a": 1 };
        let projection = Projection::exclude(["missing"]).expect("valid projection");

        assert_eq!(projection.apply(&document), doc! { "a": 1 });
    }

    #[test]
    fn apply_never_mutates_the_input() {
        let document = doc! { "a": 1, "b": 2 };
        let original = document.clone();

        let _ = Projection::include(["a"]).expect("valid").apply(&document);
        let _ = Projection::exclude(["a"]).expect("valid").apply(&document);

        assert_eq!(document, original);
    }

    #[test]
    fn empty_specifications_are_rejected() {
        assert_eq!(Projection::from_spec(&doc! {}), Err(ProjectionError::Empty));
        assert_eq!(Projection::include(Vec::<String>::new()), Err(ProjectionError::Empty));
        assert_eq!(Projection::exclude(Vec::<String>::new()), Err(ProjectionError::Empty));
    }

    #[test]
    fn mixed_specifications_are_rejected() {
        assert_eq!(Projection::from_spec(&doc! { "a": 1, "b": 0 }), Err(ProjectionError::Mixed));
        assert_eq!(Projection::from_spec(&doc! { "a": 0, "b": 1 }), Err(ProjectionError::Mixed));
    }

    #[test]
    fn from_spec_accepts_boolean_flags() {
        let include = Projection::from_spec(&doc! { "a": true }).expect("valid projection");
        assert!(include.is_include());

        let exclude = Projection::from_spec(&doc! { "a": false }).expect("valid projection");
        assert!(!exclude.is_include());
    }
}
