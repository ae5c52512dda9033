//! Reads SCXML text and projects it onto the same in-memory document shape
//! the SCJSON reader consumes, preserving element identity and order.
//! Namespace attributes are stripped and numeric-looking version strings
//! are preserved as numbers, so both input paths produce equivalent
//! documents.

use std::str;

use quick_xml::events::attributes::Attributes;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::error::EngineError;

/// A raw element tree, built before projection.
struct XmlNode {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<XmlNode>,
    text: String,
}

impl XmlNode {
    fn new(tag: &str) -> XmlNode {
        XmlNode {
            tag: tag.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
            text: String::new(),
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn children_named<'a>(&'a self, name: &str) -> Vec<&'a XmlNode> {
        self.children.iter().filter(|c| c.tag == name).collect()
    }
}

/// Strips a namespace prefix from a tag name.
fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn decode_attributes(reader: &Reader<&[u8]>, attrs: &mut Attributes) -> Result<Vec<(String, String)>, EngineError> {
    let mut out = Vec::new();
    for attr in attrs.by_ref() {
        let attr = attr.map_err(|e| EngineError::Schema(format!("Bad attribute: {}", e)))?;
        let key = reader
            .decoder()
            .decode(attr.key.as_ref())
            .map_err(|e| EngineError::Schema(format!("Bad attribute name: {}", e)))?
            .to_string();
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| EngineError::Schema(format!("Bad attribute value: {}", e)))?
            .to_string();
        out.push((local_name(&key).to_string(), value));
    }
    Ok(out)
}

/// Parses SCXML text into the projected document value.
pub fn xml_to_value(xml: &str) -> Result<Value, EngineError> {
    let root = parse_tree(xml)?;
    if root.tag != "scxml" {
        return Err(EngineError::Schema(format!(
            "Expected <scxml> root, found <{}>",
            root.tag
        )));
    }
    Ok(convert_scxml(&root))
}

fn parse_tree(xml: &str) -> Result<XmlNode, EngineError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    fn start_node(reader: &Reader<&[u8]>, e: &BytesStart) -> Result<XmlNode, EngineError> {
        let name = str::from_utf8(e.name().as_ref())
            .map_err(|err| EngineError::Schema(format!("Bad element name: {}", err)))?
            .to_string();
        let mut node = XmlNode::new(local_name(&name));
        node.attrs = decode_attributes(reader, &mut e.attributes())?;
        Ok(node)
    }

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => {
                return Err(EngineError::Schema(format!(
                    "Error at position {}: {:?}",
                    reader.buffer_position(),
                    e
                )))
            }
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let node = start_node(&reader, &e)?;
                stack.push(node);
            }
            Ok(Event::Empty(e)) => {
                let node = start_node(&reader, &e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| EngineError::Schema("Unbalanced end tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| EngineError::Schema(format!("Bad text: {}", err)))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            _ => {}
        }
        buf.clear();
    }
    root.ok_or_else(|| EngineError::Schema("Empty document".to_string()))
}

////////////////////////////////////////////////////////////////////////////
// Projection

fn set_str(map: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        map.insert(key.to_string(), Value::String(v.to_string()));
    }
}

fn id_list(value: &str) -> Value {
    Value::Array(
        value
            .split_whitespace()
            .map(|s| Value::String(s.to_string()))
            .collect(),
    )
}

fn convert_scxml(node: &XmlNode) -> Value {
    let mut map = Map::new();
    set_str(&mut map, "name", node.attr("name"));
    if let Some(version) = node.attr("version") {
        // Numeric-looking version strings are preserved as numbers.
        match version.parse::<f64>() {
            Ok(v) => {
                map.insert(
                    "version".to_string(),
                    serde_json::Number::from_f64(v)
                        .map(Value::Number)
                        .unwrap_or_else(|| Value::String(version.to_string())),
                );
            }
            Err(_) => set_str(&mut map, "version", Some(version)),
        }
    }
    set_str(&mut map, "datamodel_attribute", node.attr("datamodel"));
    set_str(&mut map, "binding", node.attr("binding"));
    if let Some(initial) = node.attr("initial") {
        map.insert("initial".to_string(), id_list(initial));
    }
    convert_state_children(node, &mut map);
    if let Some(datamodel) = convert_datamodel(node) {
        map.insert("datamodel".to_string(), datamodel);
    }
    let scripts: Vec<Value> = node
        .children_named("script")
        .iter()
        .map(|s| serde_json::json!({"content": s.text.clone()}))
        .collect();
    if !scripts.is_empty() {
        map.insert("script".to_string(), Value::Array(scripts));
    }
    Value::Object(map)
}

fn convert_state_children(node: &XmlNode, map: &mut Map<String, Value>) {
    for (tag, key) in [
        ("state", "state"),
        ("parallel", "parallel"),
        ("final", "final"),
        ("history", "history"),
    ] {
        let children: Vec<Value> = node
            .children_named(tag)
            .iter()
            .map(|c| convert_state(c))
            .collect();
        if !children.is_empty() {
            map.insert(key.to_string(), Value::Array(children));
        }
    }
}

fn convert_state(node: &XmlNode) -> Value {
    let mut map = Map::new();
    set_str(&mut map, "id", node.attr("id"));
    if let Some(initial) = node.attr("initial") {
        map.insert("initial_attribute".to_string(), id_list(initial));
    }
    if node.tag == "history" {
        set_str(&mut map, "type_value", node.attr("type"));
    }

    let initials: Vec<&XmlNode> = node.children_named("initial");
    if let Some(initial) = initials.first() {
        let transitions: Vec<Value> = initial
            .children_named("transition")
            .iter()
            .map(|t| convert_transition(t))
            .collect();
        map.insert(
            "initial".to_string(),
            serde_json::json!([{ "transition": transitions }]),
        );
    }

    for (tag, key) in [("onentry", "onentry"), ("onexit", "onexit")] {
        let blocks: Vec<Value> = node
            .children_named(tag)
            .iter()
            .map(|b| Value::Object(convert_block(b)))
            .collect();
        if !blocks.is_empty() {
            map.insert(key.to_string(), Value::Array(blocks));
        }
    }

    let transitions: Vec<Value> = node
        .children_named("transition")
        .iter()
        .map(|t| convert_transition(t))
        .collect();
    if !transitions.is_empty() {
        map.insert("transition".to_string(), Value::Array(transitions));
    }

    if let Some(datamodel) = convert_datamodel(node) {
        map.insert("datamodel".to_string(), datamodel);
    }

    let invokes: Vec<Value> = node
        .children_named("invoke")
        .iter()
        .map(|i| convert_invoke(i))
        .collect();
    if !invokes.is_empty() {
        map.insert("invoke".to_string(), Value::Array(invokes));
    }

    if let Some(donedata) = node.children_named("donedata").first() {
        map.insert("donedata".to_string(), convert_donedata(donedata));
    }

    convert_state_children(node, &mut map);
    Value::Object(map)
}

fn convert_transition(node: &XmlNode) -> Value {
    let mut map = Map::new();
    set_str(&mut map, "event", node.attr("event"));
    set_str(&mut map, "cond", node.attr("cond"));
    set_str(&mut map, "type_value", node.attr("type"));
    if let Some(target) = node.attr("target") {
        map.insert("target".to_string(), id_list(target));
    }
    let block = convert_block(node);
    for (k, v) in block {
        map.insert(k, v);
    }
    Value::Object(map)
}

fn convert_datamodel(node: &XmlNode) -> Option<Value> {
    let datamodels = node.children_named("datamodel");
    if datamodels.is_empty() {
        return None;
    }
    let mut blocks = Vec::new();
    for dm in datamodels {
        let entries: Vec<Value> = dm
            .children_named("data")
            .iter()
            .map(|d| {
                let mut e = Map::new();
                set_str(&mut e, "id", d.attr("id"));
                set_str(&mut e, "expr", d.attr("expr"));
                set_str(&mut e, "src", d.attr("src"));
                if !d.text.is_empty() {
                    let content = serde_json::from_str::<Value>(&d.text)
                        .unwrap_or_else(|_| Value::String(d.text.clone()));
                    e.insert("content".to_string(), content);
                }
                Value::Object(e)
            })
            .collect();
        blocks.push(serde_json::json!({ "data": entries }));
    }
    Some(Value::Array(blocks))
}

/// Groups the executable content children of `node` into per-kind arrays.
/// The interleaving order inside one block is not representable in the
/// projection; arrays keep their authored order per kind.
fn convert_block(node: &XmlNode) -> Map<String, Value> {
    let mut map = Map::new();
    let mut raises = Vec::new();
    let mut assigns = Vec::new();
    let mut logs = Vec::new();
    let mut sends = Vec::new();
    let mut cancels = Vec::new();
    let mut ifs = Vec::new();
    let mut foreaches = Vec::new();
    let mut scripts = Vec::new();

    for child in &node.children {
        match child.tag.as_str() {
            "raise" => {
                let mut e = Map::new();
                set_str(&mut e, "event", child.attr("event"));
                raises.push(Value::Object(e));
            }
            "assign" => {
                let mut e = Map::new();
                set_str(&mut e, "location", child.attr("location"));
                let expr = child.attr("expr").map(|s| s.to_string()).or_else(|| {
                    if child.text.is_empty() {
                        None
                    } else {
                        Some(child.text.clone())
                    }
                });
                set_str(&mut e, "expr", expr.as_deref());
                assigns.push(Value::Object(e));
            }
            "log" => {
                let mut e = Map::new();
                set_str(&mut e, "label", child.attr("label"));
                set_str(&mut e, "expr", child.attr("expr"));
                logs.push(Value::Object(e));
            }
            "send" => sends.push(convert_send(child)),
            "cancel" => {
                let mut e = Map::new();
                set_str(&mut e, "sendid", child.attr("sendid"));
                set_str(&mut e, "sendidexpr", child.attr("sendidexpr"));
                cancels.push(Value::Object(e));
            }
            "if" => ifs.push(convert_if(child)),
            "foreach" => {
                let mut e = convert_block(child);
                set_str(&mut e, "array", child.attr("array"));
                set_str(&mut e, "item", child.attr("item"));
                set_str(&mut e, "index", child.attr("index"));
                foreaches.push(Value::Object(e));
            }
            "script" => {
                scripts.push(serde_json::json!({"content": child.text.clone()}));
            }
            _ => {}
        }
    }

    for (key, list) in [
        ("raise", raises),
        ("assign", assigns),
        ("log", logs),
        ("send", sends),
        ("cancel", cancels),
        ("if", ifs),
        ("foreach", foreaches),
        ("script", scripts),
    ] {
        if !list.is_empty() {
            map.insert(key.to_string(), Value::Array(list));
        }
    }
    map
}

fn convert_send(node: &XmlNode) -> Value {
    let mut map = Map::new();
    set_str(&mut map, "event", node.attr("event"));
    set_str(&mut map, "eventexpr", node.attr("eventexpr"));
    set_str(&mut map, "target", node.attr("target"));
    set_str(&mut map, "targetexpr", node.attr("targetexpr"));
    set_str(&mut map, "type_value", node.attr("type"));
    set_str(&mut map, "typeexpr", node.attr("typeexpr"));
    set_str(&mut map, "delay", node.attr("delay"));
    set_str(&mut map, "delayexpr", node.attr("delayexpr"));
    set_str(&mut map, "id", node.attr("id"));
    set_str(&mut map, "idlocation", node.attr("idlocation"));
    set_str(&mut map, "namelist", node.attr("namelist"));
    add_params(node, &mut map);
    if let Some(content) = node.children_named("content").first() {
        map.insert("content".to_string(), convert_content(content));
    }
    Value::Object(map)
}

/// `<if>` with its `<elseif>`/`<else>` markers: the actions between the
/// markers form the branch blocks.
fn convert_if(node: &XmlNode) -> Value {
    let mut map = Map::new();
    set_str(&mut map, "cond", node.attr("cond"));

    let mut branch = XmlNode::new("then");
    let mut elseifs: Vec<Value> = Vec::new();
    let mut pending_elseif: Option<String> = None;
    let mut in_else = false;
    let mut else_block: Option<Map<String, Value>> = None;

    fn close_branch(
        branch: XmlNode,
        pending: &Option<String>,
        map: &mut Map<String, Value>,
        elseifs: &mut Vec<Value>,
        in_else: bool,
        else_block: &mut Option<Map<String, Value>>,
    ) {
        let block = convert_block(&branch);
        if in_else {
            *else_block = Some(block);
        } else {
            match pending {
                None => {
                    map.insert("then".to_string(), Value::Object(block));
                }
                Some(cond) => {
                    elseifs.push(serde_json::json!({"cond": cond, "then": block}));
                }
            }
        }
    }

    for child in &node.children {
        match child.tag.as_str() {
            "elseif" => {
                let done = std::mem::replace(&mut branch, XmlNode::new("then"));
                close_branch(done, &pending_elseif, &mut map, &mut elseifs, in_else, &mut else_block);
                pending_elseif = Some(child.attr("cond").unwrap_or_default().to_string());
            }
            "else" => {
                let done = std::mem::replace(&mut branch, XmlNode::new("then"));
                close_branch(done, &pending_elseif, &mut map, &mut elseifs, in_else, &mut else_block);
                pending_elseif = None;
                in_else = true;
            }
            _ => {
                // Moves the node into the current branch.
                branch.children.push(XmlNode {
                    tag: child.tag.clone(),
                    attrs: child.attrs.clone(),
                    children: clone_children(child),
                    text: child.text.clone(),
                });
            }
        }
    }
    close_branch(branch, &pending_elseif, &mut map, &mut elseifs, in_else, &mut else_block);

    if !elseifs.is_empty() {
        map.insert("elseif".to_string(), Value::Array(elseifs));
    }
    if let Some(block) = else_block {
        map.insert("else".to_string(), Value::Object(block));
    }
    Value::Object(map)
}

fn clone_children(node: &XmlNode) -> Vec<XmlNode> {
    node.children
        .iter()
        .map(|c| XmlNode {
            tag: c.tag.clone(),
            attrs: c.attrs.clone(),
            children: clone_children(c),
            text: c.text.clone(),
        })
        .collect()
}

fn add_params(node: &XmlNode, map: &mut Map<String, Value>) {
    let params: Vec<Value> = node
        .children_named("param")
        .iter()
        .map(|p| {
            let mut e = Map::new();
            set_str(&mut e, "name", p.attr("name"));
            set_str(&mut e, "expr", p.attr("expr"));
            set_str(&mut e, "location", p.attr("location"));
            Value::Object(e)
        })
        .collect();
    if !params.is_empty() {
        map.insert("param".to_string(), Value::Array(params));
    }
}

fn convert_content(node: &XmlNode) -> Value {
    if let Some(expr) = node.attr("expr") {
        return serde_json::json!({ "expr": expr });
    }
    if let Some(scxml) = node.children_named("scxml").first() {
        return convert_scxml(scxml);
    }
    // Literal content: parse JSON-looking text, keep the rest as a string.
    serde_json::from_str::<Value>(&node.text).unwrap_or_else(|_| Value::String(node.text.clone()))
}

fn convert_invoke(node: &XmlNode) -> Value {
    let mut map = Map::new();
    set_str(&mut map, "type_value", node.attr("type"));
    set_str(&mut map, "typeexpr", node.attr("typeexpr"));
    set_str(&mut map, "src", node.attr("src"));
    set_str(&mut map, "srcexpr", node.attr("srcexpr"));
    set_str(&mut map, "id", node.attr("id"));
    set_str(&mut map, "idlocation", node.attr("idlocation"));
    set_str(&mut map, "autoforward", node.attr("autoforward"));
    set_str(&mut map, "namelist", node.attr("namelist"));
    add_params(node, &mut map);
    if let Some(content) = node.children_named("content").first() {
        map.insert("content".to_string(), convert_content(content));
    }
    let finalize: Vec<Value> = node
        .children_named("finalize")
        .iter()
        .map(|f| Value::Object(convert_block(f)))
        .collect();
    if !finalize.is_empty() {
        map.insert("finalize".to_string(), Value::Array(finalize));
    }
    Value::Object(map)
}

fn convert_donedata(node: &XmlNode) -> Value {
    let mut map = Map::new();
    add_params(node, &mut map);
    if let Some(content) = node.children_named("content").first() {
        map.insert("content".to_string(), convert_content(content));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_a_minimal_chart() {
        let v = xml_to_value(
            "<scxml initial='a' version='1.0'>\
               <state id='a'><transition event='go' target='b'/></state>\
               <state id='b'/>\
             </scxml>",
        )
        .unwrap();
        assert_eq!(v["initial"], serde_json::json!(["a"]));
        assert_eq!(v["state"][0]["id"], "a");
        assert_eq!(v["state"][0]["transition"][0]["event"], "go");
        assert_eq!(v["state"][0]["transition"][0]["target"], serde_json::json!(["b"]));
        assert_eq!(v["version"], serde_json::json!(1.0));
    }

    #[test]
    fn converts_onentry_actions_and_history() {
        let v = xml_to_value(
            "<scxml xmlns='http://www.w3.org/2005/07/scxml' initial='p'>\
               <state id='p' initial='s1'>\
                 <onentry><log expr=\"'hi'\"/><raise event='kick'/></onentry>\
                 <history id='h' type='deep'><transition target='s1'/></history>\
                 <state id='s1'/>\
               </state>\
             </scxml>",
        )
        .unwrap();
        let p = &v["state"][0];
        assert_eq!(p["onentry"][0]["raise"][0]["event"], "kick");
        assert_eq!(p["history"][0]["type_value"], "deep");
        assert_eq!(p["history"][0]["transition"][0]["target"], serde_json::json!(["s1"]));
    }

    #[test]
    fn converts_if_chains() {
        let v = xml_to_value(
            "<scxml initial='a'>\
               <state id='a'>\
                 <onentry>\
                   <if cond='x == 1'>\
                     <raise event='one'/>\
                     <elseif cond='x == 2'/>\
                     <raise event='two'/>\
                     <else/>\
                     <raise event='other'/>\
                   </if>\
                 </onentry>\
               </state>\
             </scxml>",
        )
        .unwrap();
        let iff = &v["state"][0]["onentry"][0]["if"][0];
        assert_eq!(iff["cond"], "x == 1");
        assert_eq!(iff["then"]["raise"][0]["event"], "one");
        assert_eq!(iff["elseif"][0]["cond"], "x == 2");
        assert_eq!(iff["elseif"][0]["then"]["raise"][0]["event"], "two");
        assert_eq!(iff["else"]["raise"][0]["event"], "other");
    }
}
