use crate::error::{invalid_field_path, FirestoreResult};

/// A dot-separated path addressing a (possibly nested) document field.
///
/// Segments may be wrapped in back-ticks to carry characters that would
/// otherwise be structural, e.g. ``a.`b.c`.d`` has three segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
    quoted: Vec<bool>,
}

impl FieldPath {
    pub fn new<S, I>(segments: I) -> FirestoreResult<Self>
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(invalid_field_path("", "must contain at least one segment"));
        }
        if segments.iter().any(String::is_empty) {
            return Err(invalid_field_path(segments.join("."), "found empty segment"));
        }
        let quoted = segments.iter().map(|segment| needs_quotes(segment)).collect();
        Ok(Self { segments, quoted })
    }

    /// Parses a dot-separated path, honouring back-tick quoted segments.
    pub fn from_dot_separated(path: &str) -> FirestoreResult<Self> {
        if path.trim().is_empty() {
            return Err(invalid_field_path(path, "field path cannot be empty"));
        }

        let mut segments = Vec::new();
        let mut quoted = Vec::new();
        let mut current = String::new();
        let mut current_quoted = false;
        let mut chars = path.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '`' if current.is_empty() && !current_quoted => {
                    current_quoted = true;
                    let mut closed = false;
                    while let Some(inner) = chars.next() {
                        match inner {
                            '\\' => match chars.next() {
                                Some(escaped) => current.push(escaped),
                                None => {
                                    return Err(invalid_field_path(path, "dangling escape character"))
                                }
                            },
                            '`' => {
                                closed = true;
                                break;
                            }
                            other => current.push(other),
                        }
                    }
                    if !closed {
                        return Err(invalid_field_path(path, "unterminated back-tick"));
                    }
                    if current.is_empty() {
                        return Err(invalid_field_path(path, "found empty quoted segment"));
                    }
                    if !matches!(chars.peek(), None | Some('.')) {
                        return Err(invalid_field_path(
                            path,
                            "quoted segment must be followed by '.'",
                        ));
                    }
                }
                '`' => return Err(invalid_field_path(path, "unexpected back-tick")),
                '.' => {
                    if current.is_empty() {
                        return Err(invalid_field_path(path, "found empty segment"));
                    }
                    segments.push(std::mem::take(&mut current));
                    quoted.push(current_quoted);
                    current_quoted = false;
                }
                other => current.push(other),
            }
        }

        if current.is_empty() {
            return Err(invalid_field_path(path, "found empty segment"));
        }
        segments.push(current);
        quoted.push(current_quoted);

        Ok(Self { segments, quoted })
    }

    pub fn last_segment(&self) -> &str {
        self.segments
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Renders the path in the wire's field-path syntax.
    ///
    /// A purely numeric segment between two dots is wrapped in back-ticks, as
    /// the backend would otherwise read it as an array index instead of a map
    /// key. Segments quoted on input stay quoted.
    pub fn canonical_string(&self) -> String {
        let last = self.segments.len().saturating_sub(1);
        self.segments
            .iter()
            .zip(&self.quoted)
            .enumerate()
            .map(|(index, (segment, quoted))| {
                let interior = index > 0 && index < last;
                if *quoted || (interior && is_numeric(segment)) {
                    quote(segment)
                } else {
                    segment.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn document_id() -> Self {
        Self {
            segments: vec![crate::constants::DOCUMENT_NAME_FIELD.to_string()],
            quoted: vec![false],
        }
    }
}

/// Builds the `updateMask.fieldPaths` list for a merge write.
///
/// Order follows `keys`; duplicates are kept.
pub fn build_field_mask<I, S>(keys: I) -> FirestoreResult<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter()
        .map(|key| FieldPath::from_dot_separated(key.as_ref()).map(|path| path.canonical_string()))
        .collect()
}

fn is_numeric(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|byte| byte.is_ascii_digit())
}

fn needs_quotes(segment: &str) -> bool {
    segment.contains(['.', '`', '\\'])
}

fn quote(segment: &str) -> String {
    let escaped = segment.replace('\\', "\\\\").replace('`', "\\`");
    format!("`{escaped}`")
}

/// Trait that converts common user inputs into a validated [`FieldPath`].
pub trait IntoFieldPath {
    fn into_field_path(self) -> FirestoreResult<FieldPath>;
}

impl IntoFieldPath for FieldPath {
    fn into_field_path(self) -> FirestoreResult<FieldPath> {
        Ok(self)
    }
}

impl<'a> IntoFieldPath for &'a FieldPath {
    fn into_field_path(self) -> FirestoreResult<FieldPath> {
        Ok(self.clone())
    }
}

impl IntoFieldPath for String {
    fn into_field_path(self) -> FirestoreResult<FieldPath> {
        FieldPath::from_dot_separated(&self)
    }
}

impl<'a> IntoFieldPath for &'a str {
    fn into_field_path(self) -> FirestoreResult<FieldPath> {
        FieldPath::from_dot_separated(self)
    }
}
