//! Tag grammar for [`Column::tagged`](super::Column::tagged).
//!
//! Relational tags are `;`-separated segments: `column:<name>` or a bare `<name>` sets the column
//! name, `primaryKey` (or `primary_key`) marks the identity, `must` keeps zero values in
//! deltas, `-` hides the field, and any other `key:value` segment is ignored.
//!
//! Document tags are `,`-separated: the first segment is the field name (empty keeps the field's
//! own name, `-` hides it), followed by the `omitempty` and `must` options.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelationalTag {
    pub name: Option<&'static str>,
    pub primary_key: bool,
    pub must: bool,
    pub skip: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DocumentTag {
    pub name: Option<&'static str>,
    pub omit_empty: bool,
    pub must: bool,
    pub skip: bool,
}

pub fn parse_relational(tag: &'static str) -> RelationalTag {
    let mut parsed = RelationalTag::default();

    for segment in tag.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        match segment.split_once(':') {
            Some((key, value)) if key.trim().eq_ignore_ascii_case("column") => {
                let value = value.trim();
                if !value.is_empty() {
                    parsed.name = Some(value);
                }
            }
            Some(_) => {}
            None if segment == "-" => parsed.skip = true,
            None if segment.eq_ignore_ascii_case("primaryKey")
                || segment.eq_ignore_ascii_case("primary_key") =>
            {
                parsed.primary_key = true
            }
            None if segment.eq_ignore_ascii_case("must") => parsed.must = true,
            None if parsed.name.is_none() => parsed.name = Some(segment),
            None => {}
        }
    }

    return parsed;
}

pub fn parse_document(tag: &'static str) -> DocumentTag {
    let mut parsed = DocumentTag::default();
    let mut segments = tag.split(',').map(str::trim);

    match segments.next() {
        Some("-") => parsed.skip = true,
        Some("") | None => {}
        Some(name) => parsed.name = Some(name),
    }

    for option in segments {
        match option {
            "omitempty" => parsed.omit_empty = true,
            "must" => parsed.must = true,
            _ => {}
        }
    }

    return parsed;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relational_tags() {
        assert_eq!(
            parse_relational("column:user_id;primaryKey;type:bigint"),
            RelationalTag {
                name: Some("user_id"),
                primary_key: true,
                must: false,
                skip: false,
            }
        );
        assert_eq!(
            parse_relational("must;column:status"),
            RelationalTag {
                name: Some("status"),
                primary_key: false,
                must: true,
                skip: false,
            }
        );
        assert_eq!(parse_relational("nickname").name, Some("nickname"));
        assert!(parse_relational("-").skip);
        assert_eq!(parse_relational(""), RelationalTag::default());
    }

    #[test]
    fn must_from_either_tag() {
        use crate::schema::Column;

        assert!(Column::tagged("status", "column:status;must", "status").is_must());
        assert!(Column::tagged("status", "status", "status,must").is_must());
        assert!(!Column::tagged("status", "column:status", "status").is_must());
    }

    #[test]
    fn document_tags() {
        assert_eq!(
            parse_document("_id,omitempty"),
            DocumentTag {
                name: Some("_id"),
                omit_empty: true,
                must: false,
                skip: false,
            }
        );
        assert_eq!(
            parse_document(",must"),
            DocumentTag {
                name: None,
                omit_empty: false,
                must: true,
                skip: false,
            }
        );
        assert!(parse_document("-").skip);
    }
}
