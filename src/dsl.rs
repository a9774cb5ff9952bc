//! Schema DSL
//!
//! A schema is newline-delimited text, one property per line:
//!
//! ```text
//! [variant:]name[,type[,parse-codec[,format-codec[,constraint[,primary-key[,extra]]]]]]
//! ```
//!
//! Lines are split CSV-style: `,` separates fields, `\` escapes the next
//! character, and `"..."` escapes a whole block. A `:` before the first
//! field separator ends the optional variant tag. Trailing fields may be
//! omitted; a comma is only needed to skip a field.
//!
//! Example:
//! ```text
//! :id,long,,,,1
//! :name,java.lang.String,trim+upper,,expr{len(@value@) > 0}
//! validator:email,java.lang.String,,,notEmpty
//! ```

pub const FIELD_NAME: usize = 0;
pub const FIELD_TYPE: usize = 1;
pub const FIELD_PARSE_CODEC: usize = 2;
pub const FIELD_FORMAT_CODEC: usize = 3;
pub const FIELD_CONSTRAINT: usize = 4;
pub const FIELD_PRIMARY_KEY: usize = 5;
/// Variant-specific trailing field (the path of the XPath variant)
pub const FIELD_EXTRA: usize = 6;

const MAX_FIELDS: usize = FIELD_EXTRA + 1;

/// One parsed property line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Variant tag as written; `None` when omitted or empty
    pub variant: Option<String>,
    pub fields: Vec<String>,
}

impl PropertyDescriptor {
    pub fn name(&self) -> &str {
        self.fields.first().map(|s| s.trim()).unwrap_or("")
    }

    /// A field by position, `None` when absent or empty.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields
            .get(index)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn type_name(&self) -> Option<&str> {
        self.field(FIELD_TYPE).map(str::trim)
    }

    pub fn parse_codec(&self) -> Option<&str> {
        self.field(FIELD_PARSE_CODEC)
    }

    pub fn format_codec(&self) -> Option<&str> {
        self.field(FIELD_FORMAT_CODEC)
    }

    pub fn constraint(&self) -> Option<&str> {
        self.field(FIELD_CONSTRAINT)
    }

    pub fn extra(&self) -> Option<&str> {
        self.field(FIELD_EXTRA)
    }

    /// `"1"` marks a primary-key property; empty or `"0"` does not.
    pub fn primary_key(&self) -> Result<bool, String> {
        match self.field(FIELD_PRIMARY_KEY).map(str::trim) {
            None | Some("0") => Ok(false),
            Some("1") => Ok(true),
            Some(other) => Err(format!("invalid primary-key flag '{}' (expected 1 or 0)", other)),
        }
    }

    /// Render the canonical line: minimal escaping, blank fields emptied
    /// and trailing ones dropped. Parsing the result yields a descriptor
    /// with the same fields.
    pub fn to_line(&self) -> String {
        let blank = |field: &String| field.trim().is_empty();
        let mut last = self.fields.len();
        while last > 1 && blank(&self.fields[last - 1]) {
            last -= 1;
        }

        let mut line = String::new();
        if let Some(tag) = &self.variant {
            line.push_str(tag);
            line.push(':');
        }
        for (i, field) in self.fields[..last].iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            if !blank(field) {
                line.push_str(&escape_field(field, i == FIELD_NAME));
            }
        }
        line
    }
}

fn escape_field(field: &str, is_name: bool) -> String {
    let needs_quotes = field
        .chars()
        .any(|c| matches!(c, ',' | '"' | '\\' | '\n' | '\r') || (is_name && c == ':'));
    if !needs_quotes {
        return field.to_string();
    }
    let mut out = String::with_capacity(field.len() + 2);
    out.push('"');
    for c in field.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Non-blank lines of a schema text; `#` starts a comment line.
pub fn schema_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| {
            let trimmed = line.trim_start();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
}

/// Split one property line into its variant tag and fields.
pub fn parse_line(line: &str) -> Result<PropertyDescriptor, String> {
    let mut fields: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut variant: Option<String> = None;
    let mut in_quotes = false;
    // a tag may only be plain text
    let mut literal_in_field = false;

    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(escaped) => {
                    current.push(escaped);
                    literal_in_field = true;
                }
                None => return Err("dangling escape at end of line".to_string()),
            },
            '"' => {
                in_quotes = !in_quotes;
                literal_in_field = true;
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
                literal_in_field = false;
                if fields.len() >= MAX_FIELDS {
                    return Err(format!("too many fields (at most {})", MAX_FIELDS));
                }
            }
            ':' if !in_quotes && fields.is_empty() && variant.is_none() && !literal_in_field => {
                variant = Some(std::mem::take(&mut current).trim().to_string());
            }
            _ => current.push(ch),
        }
    }
    if in_quotes {
        return Err("unterminated quoted block".to_string());
    }
    fields.push(current);

    let descriptor = PropertyDescriptor {
        variant: variant.filter(|tag| !tag.is_empty()),
        fields,
    };
    if descriptor.name().is_empty() {
        return Err("property name is required".to_string());
    }
    Ok(descriptor)
}

/// One stage of a codec chain: `name{prop=value;...}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecStage {
    pub name: String,
    pub properties: Vec<(String, String)>,
}

impl CodecStage {
    pub fn is_service_ref(&self) -> bool {
        self.name.starts_with('$')
    }
}

/// Parse a `+`-joined codec chain.
pub fn parse_codec_spec(spec: &str) -> Result<Vec<CodecStage>, String> {
    let mut stages = Vec::new();
    for piece in split_top_level(spec, '+')? {
        let piece = piece.trim();
        if piece.is_empty() {
            return Err(format!("empty codec stage in '{}'", spec));
        }
        let (name, properties) = match piece.find('{') {
            Some(open) => {
                let body = piece[open + 1..]
                    .strip_suffix('}')
                    .ok_or_else(|| format!("codec stage '{}' is missing a closing '}}'", piece))?;
                (piece[..open].trim(), parse_codec_properties(body)?)
            }
            None => (piece, Vec::new()),
        };
        if !is_component_name(name) {
            return Err(format!("invalid codec name '{}'", name));
        }
        stages.push(CodecStage {
            name: name.to_string(),
            properties,
        });
    }
    Ok(stages)
}

fn parse_codec_properties(body: &str) -> Result<Vec<(String, String)>, String> {
    let mut properties = Vec::new();
    for assignment in split_top_level(body, ';')? {
        if assignment.trim().is_empty() {
            continue;
        }
        let eq = find_unescaped(&assignment, '=')
            .ok_or_else(|| format!("codec property '{}' is not of the form name=value", assignment))?;
        let name = unescape(assignment[..eq].trim());
        if name.is_empty() {
            return Err(format!("codec property '{}' has no name", assignment));
        }
        properties.push((name, unescape(assignment[eq + 1..].trim())));
    }
    Ok(properties)
}

/// Parsed constraint field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintSpec {
    /// `target{expression}`; `target` names the interpreter
    Expression { target: String, source: String },
    /// Bare validator name or `$service` reference
    Named(String),
}

/// Default interpreter target when `{expression}` is written without one.
pub const BUILTIN_TARGET: &str = "expr";

pub fn parse_constraint_spec(spec: &str) -> Result<ConstraintSpec, String> {
    let spec = spec.trim();
    if let Some(open) = spec.find('{') {
        let source = spec[open + 1..]
            .strip_suffix('}')
            .ok_or_else(|| format!("constraint '{}' is missing a closing '}}'", spec))?;
        let target = spec[..open].trim();
        if !target.is_empty() && !is_component_name(target) {
            return Err(format!("invalid interpreter name '{}'", target));
        }
        if source.trim().is_empty() {
            return Err("empty constraint expression".to_string());
        }
        let target = if target.is_empty() { BUILTIN_TARGET } else { target };
        return Ok(ConstraintSpec::Expression {
            target: target.to_string(),
            source: source.to_string(),
        });
    }
    if is_component_name(spec) {
        Ok(ConstraintSpec::Named(spec.to_string()))
    } else {
        Err(format!("'{}' is neither target{{expression}} nor a validator name", spec))
    }
}

/// Registry names: letters, digits, `_`, `.`, `-`, optionally prefixed by
/// `$` for a service reference.
pub fn is_component_name(name: &str) -> bool {
    let bare = name.strip_prefix('$').unwrap_or(name);
    !bare.is_empty()
        && bare
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Split on `sep` outside braces; escapes are preserved for the caller.
fn split_top_level(text: &str, sep: char) -> Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                current.push(ch);
                match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => return Err(format!("dangling escape in '{}'", text)),
                }
            }
            '{' => {
                depth += 1;
                current.push(ch);
            }
            '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("unbalanced '}}' in '{}'", text))?;
                current.push(ch);
            }
            c if c == sep && depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    if depth != 0 {
        return Err(format!("unbalanced '{{' in '{}'", text));
    }
    parts.push(current);
    Ok(parts)
}

fn find_unescaped(text: &str, target: char) -> Option<usize> {
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == target {
            return Some(i);
        }
    }
    None
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_line() {
        let d = parse_line("A").unwrap();
        assert_eq!(d.variant, None);
        assert_eq!(d.name(), "A");
        assert_eq!(d.type_name(), None);
        assert!(!d.primary_key().unwrap());
    }

    #[test]
    fn test_parse_full_line_with_empty_tag() {
        let d = parse_line(":B,java.lang.String,,,,1").unwrap();
        assert_eq!(d.variant, None);
        assert_eq!(d.name(), "B");
        assert_eq!(d.type_name(), Some("java.lang.String"));
        assert_eq!(d.parse_codec(), None);
        assert!(d.primary_key().unwrap());
    }

    #[test]
    fn test_variant_tag() {
        let d = parse_line("validator:email,String,,,notEmpty").unwrap();
        assert_eq!(d.variant.as_deref(), Some("validator"));
        assert_eq!(d.name(), "email");
        assert_eq!(d.constraint(), Some("notEmpty"));
    }

    #[test]
    fn test_colons_after_name_are_literal() {
        let d = parse_line("at,Date,date{pattern=%H:%M}").unwrap();
        assert_eq!(d.variant, None);
        assert_eq!(d.parse_codec(), Some("date{pattern=%H:%M}"));
    }

    #[test]
    fn test_escapes_and_quotes() {
        let d = parse_line(r#"a\,b,"x,y",\"q\""#).unwrap();
        assert_eq!(d.name(), "a,b");
        assert_eq!(d.fields[1], "x,y");
        assert_eq!(d.fields[2], "\"q\"");

        let quoted_colon = parse_line(r#""k:v",int"#).unwrap();
        assert_eq!(quoted_colon.variant, None);
        assert_eq!(quoted_colon.name(), "k:v");
    }

    #[test]
    fn test_malformed_lines() {
        assert!(parse_line("a,\"open").is_err());
        assert!(parse_line("a\\").is_err());
        assert!(parse_line(",int").is_err());
        assert!(parse_line("a,b,c,d,e,f,g,h").is_err());
        assert!(parse_line("a,int,,,,yes").unwrap().primary_key().is_err());
    }

    #[test]
    fn test_canonical_line_round_trips() {
        for line in [
            "A,int",
            "xpath:total,double,,,,,/order/total",
            r#""a,b",String,trim,,"expr{contains(@value@, ',')}""#,
            r#""k:v""#,
        ] {
            let parsed = parse_line(line).unwrap();
            let rendered = parsed.to_line();
            assert_eq!(parse_line(&rendered).unwrap(), parsed, "line {}", line);
        }
        assert_eq!(parse_line(":A,int,,,,").unwrap().to_line(), "A,int");
        assert_eq!(parse_line("A,int, ").unwrap().to_line(), "A,int");
        assert_eq!(parse_line("A,int, ,trim").unwrap().to_line(), "A,int,,trim");
    }

    #[test]
    fn test_codec_chain() {
        let stages = parse_codec_spec("trim+date{pattern=%Y-%m-%d;lenient=true}+$shared").unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].name, "trim");
        assert_eq!(
            stages[1].properties,
            vec![
                ("pattern".to_string(), "%Y-%m-%d".to_string()),
                ("lenient".to_string(), "true".to_string())
            ]
        );
        assert!(stages[2].is_service_ref());

        let escaped = parse_codec_spec(r"join{separator=\+}").unwrap();
        assert_eq!(escaped[0].properties[0].1, "+");

        assert!(parse_codec_spec("trim++upper").is_err());
        assert!(parse_codec_spec("date{pattern=x").is_err());
        assert!(parse_codec_spec("da te").is_err());
    }

    #[test]
    fn test_constraint_spec() {
        assert_eq!(
            parse_constraint_spec("expr{@value@ > 0}").unwrap(),
            ConstraintSpec::Expression {
                target: "expr".to_string(),
                source: "@value@ > 0".to_string()
            }
        );
        assert_eq!(
            parse_constraint_spec("{@value@ > 0}").unwrap(),
            ConstraintSpec::Expression {
                target: BUILTIN_TARGET.to_string(),
                source: "@value@ > 0".to_string()
            }
        );
        assert_eq!(
            parse_constraint_spec("$emailCheck").unwrap(),
            ConstraintSpec::Named("$emailCheck".to_string())
        );
        assert!(parse_constraint_spec("expr{}").is_err());
        assert!(parse_constraint_spec("not a name").is_err());
    }

    #[test]
    fn test_schema_lines_skip_blanks_and_comments() {
        let text = "# users\nA,int\r\n\n  \nB,String\n";
        let lines: Vec<&str> = schema_lines(text).collect();
        assert_eq!(lines, vec!["A,int", "B,String"]);
    }
}
