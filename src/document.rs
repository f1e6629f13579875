//! Walks parsed SJSON documents applying a static rule tree. Rules are pure
//! data (see `catalog`); this module owns the traversal and the terminal
//! transforms. Patching is non-destructive: the caller's document is cloned
//! and the clone rewritten in place.

use std::path::Path;

use crate::error::{PatchError, Result};
use crate::geometry::{self, PatchContext};
use crate::sjson::Value;

/// Terminal transforms over a single numeric field. All of them are pure
/// functions of the value and the patch context; which one applies to which
/// field is decided entirely by the static catalogue. Integer inputs stay
/// integers (truncating toward zero), float inputs stay floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Preserve the field's offset from the horizontal screen center.
    RecenterX,
    /// Preserve the field's offset from the vertical screen center.
    RecenterY,
    /// Preserve the field's offset from the right screen edge.
    OffsetRightX,
    /// Preserve the field's offset from the bottom screen edge.
    OffsetBottomY,
    /// Multiply by the horizontal scale factor.
    ScaleX,
    /// Multiply by the vertical scale factor.
    ScaleY,
    /// Multiply by the dominant scale factor.
    ScaleUniform,
    /// Replace with the target viewport width.
    FullWidth,
    /// Replace with the target viewport height.
    FullHeight,
}

impl Transform {
    /// `None` when the value is not numeric (the document's shape changed).
    pub fn apply(self, value: &Value, ctx: &PatchContext) -> Option<Value> {
        let (input, was_int) = match value {
            Value::Int(i) => (*i as f64, true),
            Value::Float(f) => (*f, false),
            _ => return None,
        };
        let output = match self {
            Transform::RecenterX => geometry::recompute_fixed(
                input,
                ctx.default.center_x() as f64,
                ctx.viewport.center_x() as f64,
            ),
            Transform::RecenterY => geometry::recompute_fixed(
                input,
                ctx.default.center_y() as f64,
                ctx.viewport.center_y() as f64,
            ),
            Transform::OffsetRightX => geometry::recompute_fixed(
                input,
                ctx.default.width as f64,
                ctx.viewport.width as f64,
            ),
            Transform::OffsetBottomY => geometry::recompute_fixed(
                input,
                ctx.default.height as f64,
                ctx.viewport.height as f64,
            ),
            Transform::ScaleX => geometry::rescale(input, ctx.scale.x),
            Transform::ScaleY => geometry::rescale(input, ctx.scale.y),
            Transform::ScaleUniform => geometry::rescale(input, ctx.scale.dominant),
            Transform::FullWidth => ctx.viewport.width as f64,
            Transform::FullHeight => ctx.viewport.height as f64,
        };
        Some(if was_int {
            Value::Int(output as i64)
        } else {
            Value::Float(output)
        })
    }
}

/// Declared fallback for sibling-upsert rules whose target field is absent.
#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    Int(i64),
    Float(f64),
}

impl DefaultValue {
    fn to_value(self) -> Value {
        match self {
            DefaultValue::Int(i) => Value::Int(i),
            DefaultValue::Float(f) => Value::Float(f),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldUpsert {
    pub field: &'static str,
    pub transform: Transform,
    /// Treated as the field's pristine value when the field is missing; the
    /// transformed default is inserted.
    pub default: DefaultValue,
}

/// "Find the sibling whose `match_field` equals `match_value`, then upsert
/// the named fields on it."
#[derive(Debug, Clone, Copy)]
pub struct SelectorRule {
    pub match_field: &'static str,
    pub match_value: &'static str,
    pub fields: &'static [FieldUpsert],
}

/// A node of the declarative patch tree.
#[derive(Debug, Clone, Copy)]
pub enum Rule {
    /// Recurse into named fields of a map node. A named field that is absent
    /// is fatal: the document's shape changed incompatibly.
    Fields(&'static [(&'static str, Rule)]),
    /// Transform this scalar node.
    Apply(Transform),
    /// Upsert fields on selected elements of a sequence node. Absent fields
    /// fall back to declared defaults; an absent element is skipped.
    Each(&'static [SelectorRule]),
}

/// Apply a rule tree to a document, producing a full independent copy.
/// Disjoint rule paths make the traversal order irrelevant to the result.
pub fn patch_document(doc: &Value, rule: &Rule, ctx: &PatchContext, file: &Path) -> Result<Value> {
    let mut patched = doc.clone();
    apply_rule(&mut patched, rule, ctx, file, "")?;
    Ok(patched)
}

fn apply_rule(
    node: &mut Value,
    rule: &Rule,
    ctx: &PatchContext,
    file: &Path,
    path: &str,
) -> Result<()> {
    match rule {
        Rule::Apply(transform) => match transform.apply(node, ctx) {
            Some(new_value) => {
                log::debug!(
                    "'{}': '{}' {:?} -> {:?}",
                    file.display(),
                    path,
                    node,
                    new_value
                );
                *node = new_value;
                Ok(())
            }
            None => Err(shape_error(file, path)),
        },
        Rule::Fields(children) => {
            let Value::Map(map) = node else {
                return Err(shape_error(file, path));
            };
            for (name, child_rule) in *children {
                let child_path = join_path(path, name);
                match map.get_mut(*name) {
                    Some(child) => apply_rule(child, child_rule, ctx, file, &child_path)?,
                    None => {
                        return Err(PatchError::MissingField {
                            file: file.to_path_buf(),
                            field: child_path,
                        })
                    }
                }
            }
            Ok(())
        }
        Rule::Each(selectors) => {
            let Value::Seq(items) = node else {
                return Err(shape_error(file, path));
            };
            for selector in *selectors {
                let Some(item) = items.iter_mut().find(|item| selects(item, selector)) else {
                    log::debug!(
                        "'{}': no '{} = {}' element under '{}', skipping",
                        file.display(),
                        selector.match_field,
                        selector.match_value,
                        path
                    );
                    continue;
                };
                if let Value::Map(map) = item {
                    upsert_fields(map, selector, ctx, file, path)?;
                }
            }
            Ok(())
        }
    }
}

fn selects(item: &Value, selector: &SelectorRule) -> bool {
    matches!(
        item.get(selector.match_field),
        Some(Value::Str(s)) if s.as_str() == selector.match_value
    )
}

fn upsert_fields(
    map: &mut indexmap::IndexMap<String, Value>,
    selector: &SelectorRule,
    ctx: &PatchContext,
    file: &Path,
    path: &str,
) -> Result<()> {
    for upsert in selector.fields {
        let field_path = format!(
            "{}.[{}={}].{}",
            path, selector.match_field, selector.match_value, upsert.field
        );
        let current = map
            .get(upsert.field)
            .cloned()
            .unwrap_or_else(|| upsert.default.to_value());
        match upsert.transform.apply(&current, ctx) {
            Some(new_value) => {
                log::debug!(
                    "'{}': '{}' {:?} -> {:?}",
                    file.display(),
                    field_path,
                    current,
                    new_value
                );
                map.insert(upsert.field.to_string(), new_value);
            }
            None => return Err(shape_error(file, &field_path)),
        }
    }
    Ok(())
}

fn shape_error(file: &Path, path: &str) -> PatchError {
    PatchError::MissingField {
        file: file.to_path_buf(),
        field: path.to_string(),
    }
}

fn join_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PatchContext, Viewport};
    use crate::sjson;

    // Width 2592 puts the new horizontal center at 1296.
    fn ctx() -> PatchContext {
        PatchContext::new(Viewport::new(2592, 1080), false)
    }

    fn screen_doc() -> sjson::Value {
        sjson::parse(
            r#"
            UIScreen = {
                Width = 1920
                Height = 1080
                Items = [
                    { Name = "Background" X = 1020 }
                    { Name = "Prompt" Y = 1000 }
                ]
            }
            "#,
        )
        .unwrap()
    }

    const SCREEN_RULE: Rule = Rule::Fields(&[(
        "UIScreen",
        Rule::Fields(&[
            ("Width", Rule::Apply(Transform::FullWidth)),
            (
                "Items",
                Rule::Each(&[
                    SelectorRule {
                        match_field: "Name",
                        match_value: "Background",
                        fields: &[
                            FieldUpsert {
                                field: "X",
                                transform: Transform::RecenterX,
                                default: DefaultValue::Int(960),
                            },
                            FieldUpsert {
                                field: "ScaleX",
                                transform: Transform::ScaleUniform,
                                default: DefaultValue::Float(1.0),
                            },
                        ],
                    },
                    SelectorRule {
                        match_field: "Name",
                        match_value: "NotPresent",
                        fields: &[FieldUpsert {
                            field: "X",
                            transform: Transform::RecenterX,
                            default: DefaultValue::Int(0),
                        }],
                    },
                ]),
            ),
        ]),
    )]);

    #[test]
    fn recenter_preserves_offset_from_center() {
        let patched = patch_document(&screen_doc(), &SCREEN_RULE, &ctx(), Path::new("s.sjson"))
            .unwrap();
        let screen = patched.get("UIScreen").unwrap();
        let Value::Seq(items) = screen.get("Items").unwrap() else {
            panic!()
        };
        // offset = 960 - 1020 = -60; 1296 - (-60) = 1356
        assert_eq!(items[0].get("X"), Some(&Value::Int(1356)));
    }

    #[test]
    fn upsert_inserts_transformed_default_when_field_absent() {
        let patched = patch_document(&screen_doc(), &SCREEN_RULE, &ctx(), Path::new("s.sjson"))
            .unwrap();
        let screen = patched.get("UIScreen").unwrap();
        let Value::Seq(items) = screen.get("Items").unwrap() else {
            panic!()
        };
        let Some(Value::Float(scale)) = items[0].get("ScaleX") else {
            panic!("ScaleX should have been inserted as a float");
        };
        assert!((scale - 2592.0 / 1920.0).abs() < 1e-12);
    }

    #[test]
    fn missing_selector_element_is_skipped() {
        // The "NotPresent" selector matched nothing; that must not fail and
        // must not add elements.
        let patched = patch_document(&screen_doc(), &SCREEN_RULE, &ctx(), Path::new("s.sjson"))
            .unwrap();
        let screen = patched.get("UIScreen").unwrap();
        let Value::Seq(items) = screen.get("Items").unwrap() else {
            panic!()
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn missing_required_field_is_fatal_with_dotted_path() {
        const RULE: Rule = Rule::Fields(&[(
            "UIScreen",
            Rule::Fields(&[("Missing", Rule::Apply(Transform::FullWidth))]),
        )]);
        let err = patch_document(&screen_doc(), &RULE, &ctx(), Path::new("s.sjson")).unwrap_err();
        match err {
            PatchError::MissingField { field, .. } => assert_eq!(field, "UIScreen.Missing"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_numeric_value_under_transform_is_fatal() {
        const RULE: Rule = Rule::Fields(&[(
            "UIScreen",
            Rule::Fields(&[("Width", Rule::Apply(Transform::FullWidth))]),
        )]);
        let doc = sjson::parse("UIScreen = { Width = \"wide\" }\n").unwrap();
        assert!(matches!(
            patch_document(&doc, &RULE, &ctx(), Path::new("s.sjson")),
            Err(PatchError::MissingField { .. })
        ));
    }

    #[test]
    fn original_document_is_untouched() {
        let original = screen_doc();
        let before = original.clone();
        let _ = patch_document(&original, &SCREEN_RULE, &ctx(), Path::new("s.sjson")).unwrap();
        assert_eq!(original, before);
    }

    #[test]
    fn integer_inputs_stay_integers_and_floats_stay_floats() {
        let int_in = Transform::OffsetRightX
            .apply(&Value::Int(1900), &ctx())
            .unwrap();
        assert_eq!(int_in, Value::Int(1900 + (2592 - 1920)));
        let float_in = Transform::OffsetBottomY
            .apply(&Value::Float(1000.5), &ctx())
            .unwrap();
        assert_eq!(float_in, Value::Float(1000.5));
    }
}
