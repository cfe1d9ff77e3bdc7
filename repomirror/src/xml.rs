//! Small helpers over `quick-xml` shared by the index and manifest parsers.

use quick_xml::events::{BytesStart, BytesText};

/// Read and unescape an attribute value.
pub(crate) fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>, String> {
    let Some(attr) = element
        .try_get_attribute(name)
        .map_err(|e| format!("bad attributes on <{}>: {}", tag_name(element), e))?
    else {
        return Ok(None);
    };

    attr.unescape_value()
        .map(|value| Some(value.into_owned()))
        .map_err(|e| format!("bad {} attribute on <{}>: {}", name, tag_name(element), e))
}

/// Unescaped element text.
pub(crate) fn text(text: &BytesText<'_>) -> Result<String, String> {
    text.unescape()
        .map(|value| value.into_owned())
        .map_err(|e| format!("bad text content: {}", e))
}

/// Qualified tag name for messages.
pub(crate) fn tag_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.name().as_ref()).into_owned()
}

/// Keep the first value seen for a field and report duplicates.
pub(crate) fn set_once(
    slot: &mut Option<String>,
    value: String,
    field: &str,
) -> Result<(), String> {
    if slot.is_some() {
        return Err(format!("duplicate <{}>", field));
    }
    *slot = Some(value);
    Ok(())
}
