use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::Client;
use secure_string::SecureString;
use serde::{de::DeserializeOwned, Deserialize};
use tokio::task::JoinSet;
use tracing::{error, info};

use super::{ChatTransport, CommandHandler, IncomingMessage, MessageRef};
use crate::{config::TelegramConfig, portal::Settle};

/// Seconds `getUpdates` may hold the connection open.
const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    username: Option<String>,
}

impl Update {
    pub fn into_incoming(self) -> Option<IncomingMessage> {
        let message = self.message?;
        Some(IncomingMessage {
            chat_id: message.chat.id,
            user_id: message.from?.id.to_string(),
            text: message.text?,
        })
    }
}

/// Bot API client doing long polling.
pub struct TelegramBot {
    client: Client,
    api_base: String,
    bot_token: SecureString,
}

impl TelegramBot {
    pub fn new(config: TelegramConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()
            .context("Failed to build telegram client")?;

        Ok(Self {
            client,
            api_base: config.api_base.as_str().trim_end_matches('/').to_string(),
            bot_token: config.bot_token,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.unsecure()
        )
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<T> {
        // reqwest errors carry the url, which contains the token
        let res: TelegramResponse<T> = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("Failed to call {method}"))?
            .json()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("Failed to parse {method} response"))?;

        if !res.ok {
            anyhow::bail!(
                "{method} failed - {}",
                res.description.unwrap_or_else(|| "unknown".to_string())
            );
        }

        res.result
            .ok_or_else(|| anyhow::anyhow!("{method} returned no result"))
    }

    /// Returns the bot's user name, failing when the token is rejected.
    pub async fn validate(&self) -> anyhow::Result<String> {
        let me: User = self.call("getMe", &serde_json::json!({})).await?;

        Ok(me.username.unwrap_or_else(|| me.id.to_string()))
    }

    pub async fn get_updates(&self, offset: Option<i64>) -> anyhow::Result<Vec<Update>> {
        let mut body = serde_json::json!({
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = offset.into();
        }

        self.call("getUpdates", &body).await
    }
}

#[async_trait]
impl ChatTransport for TelegramBot {
    async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<MessageRef> {
        #[derive(Deserialize)]
        struct Sent {
            message_id: i64,
        }

        let sent: Sent = self
            .call(
                "sendMessage",
                &serde_json::json!({
                    "chat_id": chat_id,
                    "text": text,
                }),
            )
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: sent.message_id,
        })
    }

    async fn edit_message(&self, message: MessageRef, text: &str) -> anyhow::Result<()> {
        self.call::<serde_json::Value>(
            "editMessageText",
            &serde_json::json!({
                "chat_id": message.chat_id,
                "message_id": message.message_id,
                "text": text,
            }),
        )
        .await?;

        Ok(())
    }
}

/// Polls updates until `shutdown` resolves. Each command runs in its own task so a slow
/// settlement does not hold back other chats.
pub async fn run<S: Settle + 'static>(
    bot: Arc<TelegramBot>,
    handler: Arc<CommandHandler<S>>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let mut offset = None;
    let mut tasks = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Stop polling");
                break;
            }
            updates = bot.get_updates(offset) => {
                let updates = match updates {
                    Ok(updates) => updates,
                    Err(e) => {
                        error!("Failed to get updates - {e:?}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };
                for update in updates {
                    offset = Some(update.update_id + 1);
                    let Some(message) = update.into_incoming() else {
                        continue;
                    };
                    let bot = bot.clone();
                    let handler = handler.clone();
                    tasks.spawn(async move {
                        if let Err(e) = handler.handle(&*bot, &message).await {
                            error!("Failed to handle {:?} - {e:?}", message.text);
                        }
                    });
                }
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!("Command task failed - {e}");
                }
            }
        }
    }

    tasks.abort_all();

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{TelegramResponse, Update};
    use crate::bot::IncomingMessage;

    #[test]
    fn converts_text_message() {
        let res: TelegramResponse<Vec<Update>> = serde_json::from_value(serde_json::json!({
            "ok": true,
            "result": [{
                "update_id": 10,
                "message": {
                    "message_id": 3,
                    "date": 1714524600,
                    "chat": { "id": 77, "type": "private" },
                    "from": { "id": 1001, "is_bot": false, "first_name": "Owner" },
                    "text": "/park 12가3456"
                }
            }]
        }))
        .unwrap();

        let incoming = res
            .result
            .unwrap()
            .into_iter()
            .map(Update::into_incoming)
            .collect::<Vec<_>>();
        assert_eq!(
            incoming,
            vec![Some(IncomingMessage {
                chat_id: 77,
                user_id: "1001".to_string(),
                text: "/park 12가3456".to_string(),
            })]
        );
    }

    #[test]
    fn skips_updates_without_text() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 11,
            "message": {
                "message_id": 4,
                "chat": { "id": 77 },
                "from": { "id": 1001 },
                "sticker": {}
            }
        }))
        .unwrap();

        assert_eq!(update.into_incoming(), None);
    }

    #[test]
    fn error_response_keeps_description() {
        let res: TelegramResponse<Vec<Update>> = serde_json::from_value(serde_json::json!({
            "ok": false,
            "error_code": 401,
            "description": "Unauthorized"
        }))
        .unwrap();

        assert!(!res.ok);
        assert_eq!(res.description.as_deref(), Some("Unauthorized"));
    }
}
