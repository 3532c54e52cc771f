//! Schema-driven segment codec.
//!
//! A segment schema is a struct whose fields declare 1-based HL7 field
//! indices through the [`hl7_segment!`] macro. Decoding and encoding are
//! generic over the schema, so adding a segment type means declaring its
//! index mapping and nothing else.

/// A struct with a compile-time HL7 field-index table.
pub trait SegmentSchema: Default {
    /// Three-letter segment name (`MSH`, `PID`, ...).
    const NAME: &'static str;
    /// Highest 1-based field index the schema declares.
    const MAX_INDEX: usize;

    /// Assign one field by 1-based index. Undeclared indices are ignored.
    fn set_field(&mut self, index: usize, value: &str);

    /// Read one field by 1-based index. `None` for undeclared indices.
    fn field(&self, index: usize) -> Option<&str>;
}

/// Declare an HL7 segment schema.
///
/// ```
/// labwire_hl7::hl7_segment! {
///     /// Message acknowledgment segment.
///     pub struct Msa("MSA") {
///         1 => acknowledgment_code,
///         2 => message_control_id,
///         3 => text_message,
///     }
/// }
/// ```
#[macro_export]
macro_rules! hl7_segment {
    (
        $(#[$meta:meta])*
        pub struct $name:ident ( $segname:literal ) {
            $( $idx:literal => $field:ident ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $( pub $field: String, )+
        }

        impl $crate::segment::SegmentSchema for $name {
            const NAME: &'static str = $segname;
            const MAX_INDEX: usize = {
                let mut max = 0;
                $( if $idx > max { max = $idx; } )+
                max
            };

            fn set_field(&mut self, index: usize, value: &str) {
                match index {
                    $( $idx => self.$field = value.to_owned(), )+
                    _ => {}
                }
            }

            fn field(&self, index: usize) -> Option<&str> {
                match index {
                    $( $idx => Some(self.$field.as_str()), )+
                    _ => None,
                }
            }
        }
    };
}

/// Populate a schema from raw field values. `fields[0]` is field 1; indices
/// the schema does not declare, and fields past the end of the slice, are
/// skipped rather than errored.
pub fn populate<S: SegmentSchema>(fields: &[&str]) -> S {
    let mut segment = S::default();
    for (i, value) in fields.iter().enumerate() {
        segment.set_field(i + 1, value);
    }
    segment
}

/// Serialize one segment to its pipe-delimited line, trailing separators
/// trimmed. MSH gets the standard special case: field 1 is the separator
/// itself, so serialization starts at field 2.
pub fn serialize_segment<S: SegmentSchema>(segment: &S) -> String {
    let start = if S::NAME == "MSH" { 2 } else { 1 };
    let mut fields: Vec<&str> = (start..=S::MAX_INDEX)
        .map(|i| segment.field(i).unwrap_or(""))
        .collect();
    while fields.len() > 1 && fields.last() == Some(&"") {
        fields.pop();
    }
    format!("{}|{}", S::NAME, fields.join("|"))
}

/// Join serialized segment lines into one message, CR-separated.
pub fn serialize_message(segments: &[String]) -> String {
    segments.join("\r")
}

#[cfg(test)]
mod tests {
    use super::*;

    hl7_segment! {
        pub struct Probe("ZPR") {
            1 => alpha,
            3 => gamma,
        }
    }

    #[test]
    fn populate_assigns_by_index_and_skips_gaps() {
        let p: Probe = populate(&["a", "ignored", "c", "out-of-schema"]);
        assert_eq!(p.alpha, "a");
        assert_eq!(p.gamma, "c");
    }

    #[test]
    fn populate_tolerates_short_input() {
        let p: Probe = populate(&["a"]);
        assert_eq!(p.alpha, "a");
        assert_eq!(p.gamma, "");
    }

    #[test]
    fn serialize_trims_trailing_separators() {
        let p = Probe {
            alpha: "a".into(),
            gamma: String::new(),
        };
        assert_eq!(serialize_segment(&p), "ZPR|a");
    }

    #[test]
    fn serialize_keeps_interior_gaps() {
        let p = Probe {
            alpha: "a".into(),
            gamma: "c".into(),
        };
        assert_eq!(serialize_segment(&p), "ZPR|a||c");
    }
}
