//! XML codec for the plain mapping form.
//!
//! XML has no native types, so leaves are tagged with a `_type` attribute
//! (`int`, `float`, `bool`, `null`; strings carry none). A list stored under
//! `tag` is written as children all named `_tag`. Empty lists and mappings
//! are marked `_type="list"` / `_type="dict"` so they read back as such.

use super::node::GLOBALS_KEY;
use super::value::format_float;
use crate::error::{ConfigError, ConfigResult};
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Number, Value as Json};

/// Name of the document element.
pub const ROOT_TAG: &str = "config";

const TYPE_ATTR: &str = "_type";

/// Encode entries (and globals, written first) as an XML document.
pub fn to_xml(entries: &Map<String, Json>, globals: Option<&Map<String, Json>>) -> ConfigResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(ConfigError::xml)?;

    let mut root = Map::new();
    if let Some(globals) = globals.filter(|g| !g.is_empty()) {
        root.insert(GLOBALS_KEY.to_string(), Json::Object(globals.clone()));
    }
    root.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
    write_value(&mut writer, ROOT_TAG, &Json::Object(root))?;

    String::from_utf8(writer.into_inner()).map_err(ConfigError::xml)
}

fn write_value(writer: &mut Writer<Vec<u8>>, tag: &str, value: &Json) -> ConfigResult<()> {
    match value {
        Json::Null => write_empty(writer, tag, Some("null")),
        Json::Bool(b) => write_leaf(writer, tag, Some("bool"), &b.to_string()),
        Json::Number(n) => {
            if n.is_f64() {
                let text = format_float(n.as_f64().unwrap_or(f64::NAN));
                write_leaf(writer, tag, Some("float"), &text)
            } else {
                write_leaf(writer, tag, Some("int"), &n.to_string())
            }
        }
        Json::String(s) if s.is_empty() => write_empty(writer, tag, None),
        Json::String(s) => write_leaf(writer, tag, None, s),
        Json::Array(items) if items.is_empty() => write_empty(writer, tag, Some("list")),
        Json::Array(items) => {
            let item_tag = format!("_{}", tag);
            write_event(writer, Event::Start(BytesStart::new(tag)))?;
            for item in items {
                write_value(writer, &item_tag, item)?;
            }
            write_event(writer, Event::End(BytesEnd::new(tag)))
        }
        Json::Object(map) if map.is_empty() => write_empty(writer, tag, Some("dict")),
        Json::Object(map) => {
            write_event(writer, Event::Start(BytesStart::new(tag)))?;
            for (key, child) in map {
                write_value(writer, key, child)?;
            }
            write_event(writer, Event::End(BytesEnd::new(tag)))
        }
    }
}

fn start_tag<'a>(tag: &'a str, type_name: Option<&'a str>) -> BytesStart<'a> {
    let mut start = BytesStart::new(tag);
    if let Some(type_name) = type_name {
        start.push_attribute((TYPE_ATTR, type_name));
    }
    start
}

fn write_empty(writer: &mut Writer<Vec<u8>>, tag: &str, type_name: Option<&str>) -> ConfigResult<()> {
    write_event(writer, Event::Empty(start_tag(tag, type_name)))
}

fn write_leaf(
    writer: &mut Writer<Vec<u8>>,
    tag: &str,
    type_name: Option<&str>,
    text: &str,
) -> ConfigResult<()> {
    write_event(writer, Event::Start(start_tag(tag, type_name)))?;
    write_event(writer, Event::Text(BytesText::new(text)))?;
    write_event(writer, Event::End(BytesEnd::new(tag)))
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> ConfigResult<()> {
    writer.write_event(event).map_err(ConfigError::xml)
}

/// Parsed element, before type interpretation.
#[derive(Debug, Default)]
struct Element {
    name: String,
    type_name: Option<String>,
    text: String,
    children: Vec<Element>,
}

/// Decode an XML document into a JSON object.
pub fn from_xml(text: &str) -> ConfigResult<Json> {
    let root = parse_tree(text)?;
    if root.children.is_empty() {
        return Ok(Json::Object(Map::new()));
    }
    element_to_json(root)
}

fn parse_tree(text: &str) -> ConfigResult<Element> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event().map_err(ConfigError::xml)? {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let element = element_from(&start)?;
                close_element(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ConfigError::xml("unbalanced closing tag"))?;
                close_element(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let raw = std::str::from_utf8(&text).map_err(ConfigError::xml)?;
                    let unescaped = quick_xml::escape::unescape(raw).map_err(ConfigError::xml)?;
                    current.text.push_str(&unescaped);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(std::str::from_utf8(&data).map_err(ConfigError::xml)?);
                }
            }
            Event::GeneralRef(reference) => {
                if let Some(current) = stack.last_mut() {
                    if let Some(ch) = reference.resolve_char_ref().map_err(ConfigError::xml)? {
                        current.text.push(ch);
                    } else {
                        let name = std::str::from_utf8(&reference).map_err(ConfigError::xml)?;
                        let text = resolve_predefined_entity(name).ok_or_else(|| {
                            ConfigError::xml(format!("unknown entity &{};", name))
                        })?;
                        current.text.push_str(text);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ConfigError::xml("unexpected end of document"));
    }
    root.ok_or_else(|| ConfigError::xml("document has no root element"))
}

fn close_element(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn element_from(start: &BytesStart<'_>) -> ConfigResult<Element> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(ConfigError::xml)?
        .to_string();
    let mut type_name = None;
    for attr in start.attributes() {
        let attr = attr.map_err(ConfigError::xml)?;
        if attr.key.as_ref() == TYPE_ATTR.as_bytes() {
            let raw = std::str::from_utf8(&attr.value).map_err(ConfigError::xml)?;
            type_name = Some(quick_xml::escape::unescape(raw).map_err(ConfigError::xml)?.into_owned());
        }
    }
    Ok(Element {
        name,
        type_name,
        ..Element::default()
    })
}

fn element_to_json(element: Element) -> ConfigResult<Json> {
    if element.children.is_empty() {
        return leaf_to_json(element);
    }

    let item_tag = format!("_{}", element.name);
    if element.children[0].name == item_tag {
        let items = element
            .children
            .into_iter()
            .filter(|child| child.name == item_tag)
            .map(element_to_json)
            .collect::<ConfigResult<Vec<_>>>()?;
        return Ok(Json::Array(items));
    }

    let mut map = Map::new();
    for child in element.children {
        let key = child.name.clone();
        map.insert(key, element_to_json(child)?);
    }
    Ok(Json::Object(map))
}

fn leaf_to_json(element: Element) -> ConfigResult<Json> {
    let text = element.text;
    let invalid = |type_name: &str| {
        ConfigError::InvalidSource(format!(
            "element <{}> holds {:?}, not a valid {}",
            element.name, text, type_name
        ))
    };

    match element.type_name.as_deref() {
        None | Some("str") => Ok(Json::String(text.clone())),
        Some("int") => {
            let trimmed = text.trim();
            trimmed
                .parse::<i64>()
                .map(Json::from)
                .or_else(|_| trimmed.parse::<u64>().map(Json::from))
                .map_err(|_| invalid("int"))
        }
        Some("float") => text
            .trim()
            .parse::<f64>()
            .ok()
            .map(|f| Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null))
            .ok_or_else(|| invalid("float")),
        Some("bool") => match text.trim().to_lowercase().as_str() {
            "true" | "1" => Ok(Json::Bool(true)),
            "false" | "0" => Ok(Json::Bool(false)),
            _ => Err(invalid("bool")),
        },
        Some("null") => Ok(Json::Null),
        Some("list") => Ok(Json::Array(Vec::new())),
        Some("dict") => Ok(Json::Object(Map::new())),
        Some(other) => Err(ConfigError::InvalidSource(format!(
            "unknown type {} in xml",
            other
        ))),
    }
}
