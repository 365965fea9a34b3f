use serde_json::Value;

use crate::types::{Direction, Element};

#[derive(Debug)]
pub enum ParsedClientMessage {
    Join {
        name: Option<String>,
        element: Option<Element>,
        spectator: bool,
    },
    Movement {
        direction: Direction,
    },
    SetName {
        name: String,
    },
    /// Raw element name. The engine reports unknown ones back to the client.
    SetElement {
        element: String,
    },
    Chat {
        message: String,
    },
    Ping {
        t: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "join" => {
            let name = match object.get("name") {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.as_str()?.to_string()),
            };
            // Unknown elements are only a preference; the engine picks a free one.
            let element = match object.get("element") {
                None | Some(Value::Null) => None,
                Some(value) => Element::parse(value.as_str()?),
            };
            let spectator = match object.get("spectator") {
                None => false,
                Some(value) => value.as_bool()?,
            };
            Some(ParsedClientMessage::Join {
                name,
                element,
                spectator,
            })
        }
        "movement" => {
            let direction = Direction::parse_move(object.get("direction")?.as_str()?)?;
            Some(ParsedClientMessage::Movement { direction })
        }
        "set_name" => {
            let name = object.get("name")?.as_str()?.to_string();
            Some(ParsedClientMessage::SetName { name })
        }
        "set_element" => {
            let element = object.get("element")?.as_str()?.to_string();
            Some(ParsedClientMessage::SetElement { element })
        }
        "chat" => {
            let message = object.get("message")?.as_str()?.to_string();
            Some(ParsedClientMessage::Chat { message })
        }
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}
