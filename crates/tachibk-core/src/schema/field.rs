//! Turns a constructor parameter list into field descriptors.

use super::declaration::CodeChars;
use super::{Cardinality, FieldDescriptor, FieldKind};
use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;

/// Messages named with this prefix number their annotated fields one higher
pub const BROKEN_PREFIX: &str = "Broken";

/// Collection wrappers that make a field repeated
const COLLECTIONS: [&str; 2] = ["List", "Set"];

/// Annotations, modifiers, `val`/`var`, name and colon; the type follows in `rest`
static PARAMETER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^\s*(?P<annotations>(?:@[\w.]+(?:\s*\([^)]*\))?\s*)*)(?:(?:override|private|public|internal|protected|open|final)\s+)*(?:val|var)\s+(?P<name>\w+)\s*:\s*(?P<rest>.*)$",
    )
    .expect("Invalid parameter regex")
});

/// An annotation whose only argument is an integer literal, e.g. `@ProtoNumber(3)`
static NUMBER_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@[\w.]+\s*\(\s*(\d+)\s*\)").expect("Invalid number annotation regex")
});

/// Extracts the fields of `message` from its constructor parameter text.
///
/// Parameters that are not properties (no `val`/`var`) or whose type cannot
/// be read are skipped. Unannotated fields get number 1.
pub fn extract_fields(message: &str, parameters: &str) -> Vec<FieldDescriptor> {
    let code: String = CodeChars::new(parameters).map(|(_, c)| c).collect();
    let shift = u32::from(message.starts_with(BROKEN_PREFIX));

    split_parameters(&code)
        .into_iter()
        .filter_map(|parameter| {
            let field = parse_parameter(parameter, shift);
            if field.is_none() && !parameter.trim().is_empty() {
                trace!("Skipping parameter of {}: {}", message, parameter.trim());
            }
            field
        })
        .collect()
}

/// Splits on commas that are not nested in brackets of any kind.
fn split_parameters(code: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut previous = '\0';

    for (i, c) in code.char_indices() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            // `->` in function types is not a bracket
            '>' if previous == '-' => {}
            ')' | ']' | '}' | '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&code[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        previous = c;
    }
    parts.push(&code[start..]);
    parts
}

fn parse_parameter(parameter: &str, shift: u32) -> Option<FieldDescriptor> {
    let captures = PARAMETER.captures(parameter)?;
    let name = captures.name("name")?.as_str();
    let declared = parse_type(captures.name("rest")?.as_str())?;

    let annotated = captures
        .name("annotations")
        .and_then(|annotations| NUMBER_ANNOTATION.captures(annotations.as_str()))
        .and_then(|number| number[1].parse::<u32>().ok());
    let number = match annotated {
        Some(number) => match number.checked_add(shift) {
            Some(number) => number,
            None => {
                trace!("Field number of {} out of range: {}", name, number);
                return None;
            }
        },
        None => 1,
    };

    let (kind, cardinality) = match declared.element {
        Some(element) => (FieldKind::from_kotlin(element), Cardinality::Repeated),
        None if declared.nullable || declared.defaulted => {
            (FieldKind::from_kotlin(declared.base), Cardinality::Optional)
        }
        None => (FieldKind::from_kotlin(declared.base), Cardinality::Required),
    };

    Some(FieldDescriptor::new(name, kind, cardinality, number))
}

/// The parts of a declared type that matter for the schema
#[derive(Debug, PartialEq, Eq)]
struct DeclaredType<'a> {
    /// Simple name of the type, package stripped
    base: &'a str,
    /// Element type when the type is `List<T>` or `Set<T>`
    element: Option<&'a str>,
    nullable: bool,
    defaulted: bool,
}

fn parse_type(text: &str) -> Option<DeclaredType<'_>> {
    let (qualified, mut rest) = split_identifier(text.trim_start())?;
    let base = simple_name(qualified);

    let mut argument = None;
    rest = rest.trim_start();
    if rest.starts_with('<') {
        let close = matching_angle(rest)?;
        argument = Some(&rest[1..close]);
        rest = rest[close + 1..].trim_start();
    }

    let nullable = rest.starts_with('?');
    if nullable {
        rest = rest[1..].trim_start();
    }
    let defaulted = rest.starts_with('=');

    let element = match argument {
        Some(argument) if COLLECTIONS.contains(&base) => {
            let (inner, _) = split_identifier(argument.trim_start())?;
            Some(simple_name(inner))
        }
        _ => None,
    };

    Some(DeclaredType {
        base,
        element,
        nullable,
        defaulted,
    })
}

/// Splits a possibly dotted identifier off the front of `text`.
fn split_identifier(text: &str) -> Option<(&str, &str)> {
    let end = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    Some(text.split_at(end))
}

fn simple_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

/// Index of the `>` closing the `<` at the start of `text`.
fn matching_angle(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ScalarType;

    fn field(name: &str, kind: FieldKind, cardinality: Cardinality, number: u32) -> FieldDescriptor {
        FieldDescriptor::new(name, kind, cardinality, number)
    }

    #[test]
    fn test_annotated_and_collection_fields() {
        let fields = extract_fields("Foo", "@Num(3) val bar: String, val baz: List<Int>");
        assert_eq!(
            fields,
            vec![
                field("bar", FieldKind::Scalar(ScalarType::String), Cardinality::Required, 3),
                field("baz", FieldKind::Scalar(ScalarType::Int32), Cardinality::Repeated, 1),
            ]
        );
    }

    #[test]
    fn test_broken_prefix_shifts_annotated_numbers() {
        let fields = extract_fields(
            "BrokenThing",
            "@ProtoNumber(2) val a: Long, val b: Int",
        );
        assert_eq!(fields[0].number, 3);
        assert_eq!(fields[1].number, 1);
    }

    #[test]
    fn test_broken_shift_past_u32_skips_field() {
        let fields = extract_fields(
            "BrokenThing",
            "@ProtoNumber(4294967295) val a: Long, @ProtoNumber(4294967294) val b: Int",
        );
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "b");
        assert_eq!(fields[0].number, u32::MAX);

        let fields = extract_fields("Thing", "@ProtoNumber(4294967295) val a: Long");
        assert_eq!(fields[0].number, u32::MAX);
    }

    #[test]
    fn test_optional_markers() {
        let text = r#"
    @ProtoNumber(1) var url: String,
    @ProtoNumber(2) var title: String = "",
    @ProtoNumber(3) var artist: String? = null,
    @ProtoNumber(4) var genre: List<String>? = emptyList(),
    @ProtoNumber(5) var lastRead: Long?,
"#;
        let cardinalities: Vec<_> = extract_fields("BackupManga", text)
            .into_iter()
            .map(|f| f.cardinality)
            .collect();
        assert_eq!(
            cardinalities,
            [
                Cardinality::Required,
                Cardinality::Optional,
                Cardinality::Optional,
                Cardinality::Repeated,
                Cardinality::Optional,
            ]
        );
    }

    #[test]
    fn test_named_references_and_qualified_types() {
        let text = "@ProtoNumber(1) val value: PreferenceValue, @ProtoNumber(2) val chapters: Set<eu.kanade.BackupChapter>, @ProtoNumber(3) val flag: kotlin.Boolean";
        let fields = extract_fields("BackupPreference", text);
        assert_eq!(fields[0].kind, FieldKind::Named("PreferenceValue".into()));
        assert_eq!(fields[1].kind, FieldKind::Named("BackupChapter".into()));
        assert_eq!(fields[1].cardinality, Cardinality::Repeated);
        assert_eq!(fields[2].kind, FieldKind::Scalar(ScalarType::Bool));
    }

    #[test]
    fn test_commented_out_parameters_are_ignored() {
        let text = "\n    @ProtoNumber(1) val a: Int,\n    // @ProtoNumber(2) val b: Int,\n    /* @ProtoNumber(3) val c: Int, */\n    @ProtoNumber(4) val d: Int,\n";
        let names: Vec<_> = extract_fields("X", text).into_iter().map(|f| f.name).collect();
        assert_eq!(names, ["a", "d"]);
    }

    #[test]
    fn test_other_annotations_and_modifiers() {
        let text = "@SerialName(\"x\") @ProtoNumber(7) override val id: Long, private val hidden: Float = 1f";
        let fields = extract_fields("X", text);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].number, 7);
        assert_eq!(fields[0].kind, FieldKind::Scalar(ScalarType::Int64));
        assert_eq!(fields[1].cardinality, Cardinality::Optional);
    }

    #[test]
    fn test_nested_default_values_do_not_split() {
        let text = "@ProtoNumber(1) val a: Map<String, Int> = mapOf(1 to 2, 3 to 4), @ProtoNumber(2) val b: Int";
        let fields = extract_fields("X", text);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].kind, FieldKind::Named("Map".into()));
        assert_eq!(fields[1].name, "b");
    }

    #[test]
    fn test_non_property_parameters_are_skipped() {
        let fields = extract_fields("X", "source: Long, val kept: Int, callback: (Int) -> Unit");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "kept");
    }

    #[test]
    fn test_split_parameters() {
        assert_eq!(
            split_parameters("a: Int, b: Pair<A, B>, c: (X, Y) -> Z"),
            ["a: Int", " b: Pair<A, B>", " c: (X, Y) -> Z"]
        );
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(
            parse_type("List<Long>? = null"),
            Some(DeclaredType {
                base: "List",
                element: Some("Long"),
                nullable: true,
                defaulted: true,
            })
        );
        assert_eq!(parse_type("(Int) -> Unit"), None);
    }
}
