use std::collections::HashSet;

use async_trait::async_trait;
use itertools::Itertools as _;
use tracing::{info, warn};

use crate::portal::{Settle, Settlement, SettlementError};

pub mod telegram;

pub const HELP_MESSAGE: &str = "/park [차량번호] 로 주차 정산을 할 수 있습니다.\n";
pub const PERMISSION_DENIED_MESSAGE: &str = "You do not have permission.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    /// Settlement for a plate. `None` when the plate was omitted.
    Park(Option<String>),
}

impl Command {
    /// Parses `/start` and `/park <plate>`. A command addressed as `/park@name` is only
    /// accepted when `name` is `bot_name`; group chats deliver commands meant for other bots.
    /// Other text is not a command of this bot.
    pub fn parse(text: &str, bot_name: Option<&str>) -> Option<Self> {
        let mut words = text.split_whitespace();
        let command = words.next()?.strip_prefix('/')?;
        let command = match command.split_once('@') {
            Some((command, addressee)) => {
                if let Some(bot_name) = bot_name {
                    if !addressee.eq_ignore_ascii_case(bot_name) {
                        return None;
                    }
                }
                command
            }
            None => command,
        };

        match command {
            "start" => Some(Command::Start),
            "park" => Some(Command::Park(words.next().map(str::to_string))),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub user_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<MessageRef>;

    async fn edit_message(&self, message: MessageRef, text: &str) -> anyhow::Result<()>;
}

/// Allow-list of chat user ids.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    allowed: HashSet<String>,
}

impl Authorizer {
    pub fn new(allowed: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn is_allowed(&self, user_id: &str) -> bool {
        self.allowed.contains(user_id)
    }
}

pub fn render_settlement(settlement: &Settlement) -> String {
    let mut reply = format!(
        "차량번호: {}\n주차시간: {}\n사용 주차권: {}",
        settlement.plate,
        settlement.parking_time,
        settlement.applied.iter().map(|ticket| ticket.name()).join(", ")
    );
    if !settlement.failed.is_empty() {
        reply.push_str("\n적용 실패: ");
        reply.push_str(&settlement.failed.iter().map(|ticket| ticket.name()).join(", "));
    }
    reply
}

pub fn render_outcome(outcome: &Result<Settlement, SettlementError>) -> String {
    match outcome {
        Ok(settlement) => render_settlement(settlement),
        Err(e) => e.to_string(),
    }
}

pub struct CommandHandler<S> {
    settle: S,
    authorizer: Authorizer,
    bot_name: Option<String>,
}

impl<S: Settle> CommandHandler<S> {
    pub fn new(settle: S, authorizer: Authorizer) -> Self {
        Self {
            settle,
            authorizer,
            bot_name: None,
        }
    }

    /// Ignores commands addressed to any bot other than `bot_name`.
    pub fn with_bot_name(mut self, bot_name: impl Into<String>) -> Self {
        self.bot_name = Some(bot_name.into());
        self
    }

    pub async fn handle(
        &self,
        transport: &dyn ChatTransport,
        message: &IncomingMessage,
    ) -> anyhow::Result<()> {
        let Some(command) = Command::parse(&message.text, self.bot_name.as_deref()) else {
            return Ok(());
        };

        if !self.authorizer.is_allowed(&message.user_id) {
            warn!("Deny {command:?} from {}", message.user_id);
            transport
                .send_message(message.chat_id, PERMISSION_DENIED_MESSAGE)
                .await?;
            return Ok(());
        }

        match command {
            Command::Start | Command::Park(None) => {
                transport.send_message(message.chat_id, HELP_MESSAGE).await?;
            }
            Command::Park(Some(plate)) => {
                info!("Settle {plate} for {}", message.user_id);
                let progress = transport
                    .send_message(
                        message.chat_id,
                        &format!("{plate}의 차량번호를 확인 중입니다...."),
                    )
                    .await?;

                let outcome = self.settle.get_car_info(&plate).await;
                if let Err(e) = &outcome {
                    info!("Settlement of {plate} ended - {e:?}");
                }

                transport
                    .edit_message(progress, &render_outcome(&outcome))
                    .await?;
            }
        }

        Ok(())
    }
}
