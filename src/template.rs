//! `{name}` placeholder substitution and JSON extraction from model text

use std::collections::HashMap;
use serde_json::{Map, Value};
use log::{debug, trace};

/// Replace every `{name}` whose name is in `variables`.
/// Unknown placeholders and unbalanced braces are copied verbatim.
pub fn render(
  template: &str
, variables: &HashMap<String, String>
) -> String
{   let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{')
    {   out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find(|c: char| c == '}' || c == '{')
        {   Some(close) if after.as_bytes()[close] == b'}' => {
              let name = &after[..close];
              match variables.get(name)
              {   Some(value) => out.push_str(value)
                , None => {
                    trace!("Leaving placeholder {{{}}} unfilled", name);
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                  }
              }
              rest = &after[close + 1..];
            }
          , _ => {
              out.push('{');
              rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Extract a JSON object from model output that may carry prose or
/// Markdown code fences. Anything that is not an object (numbers,
/// arrays, unparseable text) yields an empty object.
pub fn clean_and_parse_json(text: &str) -> Value
{   let trimmed = text.trim();
    let fenced = fenced_body(trimmed);

    for candidate in fenced.into_iter().chain(std::iter::once(trimmed))
    {   if let Some(object) = parse_object(candidate)
        {   return object;
        }
    }

    debug!("No parseable JSON object in model output");
    Value::Object(Map::new())
}

/// The whole text as an object, else its outermost `{...}` span
fn parse_object(text: &str) -> Option<Value>
{   if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text)
    {   return Some(value);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start >= end
    {   return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end])
    {   Ok(value @ Value::Object(_)) => Some(value)
      , _ => None
    }
}

/// Body of the first ``` fence, without its info string
fn fenced_body(text: &str) -> Option<&str>
{   let open = text.find("```")?;
    let body = &text[open + 3..];
    // info string: a bare word right after the fence, e.g. ```json
    let word_len = body
      .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
      .unwrap_or(body.len());
    let body = &body[word_len..];
    match body.find("```")
    {   Some(close) => Some(body[..close].trim())
      , None => Some(body.trim())
    }
}
