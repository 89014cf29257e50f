use scraper::Html;

use crate::selector;

pub const VIEW_STATE: &str = "__VIEWSTATE";
pub const VIEW_STATE_GENERATOR: &str = "__VIEWSTATEGENERATOR";
pub const EVENT_VALIDATION: &str = "__EVENTVALIDATION";

/// Hidden state the portal embeds in every page with a form.
///
/// The portal issues new values with each response, so tokens are only good for the next
/// submission against the page they were scraped from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormTokens {
    pub view_state: String,
    pub view_state_generator: String,
    pub event_validation: String,
}

impl FormTokens {
    pub fn fields(&self) -> [(&'static str, &str); 3] {
        [
            (VIEW_STATE, self.view_state.as_str()),
            (VIEW_STATE_GENERATOR, self.view_state_generator.as_str()),
            (EVENT_VALIDATION, self.event_validation.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed page - hidden field {0} is missing")]
pub struct MalformedPage(pub &'static str);

pub fn extract_tokens(document: &Html) -> Result<FormTokens, MalformedPage> {
    Ok(FormTokens {
        view_state: hidden_value(document, selector!("input#__VIEWSTATE"), VIEW_STATE)?,
        view_state_generator: hidden_value(
            document,
            selector!("input#__VIEWSTATEGENERATOR"),
            VIEW_STATE_GENERATOR,
        )?,
        event_validation: hidden_value(
            document,
            selector!("input#__EVENTVALIDATION"),
            EVENT_VALIDATION,
        )?,
    })
}

fn hidden_value(
    document: &Html,
    selector: &scraper::Selector,
    name: &'static str,
) -> Result<String, MalformedPage> {
    document
        .select(selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::to_string)
        .ok_or(MalformedPage(name))
}
