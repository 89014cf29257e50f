use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::{cookie::Jar, Client, Url};
use scraper::Html;
use secure_string::SecureString;
use tracing::{error, info, warn};

use crate::{
    config::PortalConfig,
    discount::{allocate, DiscountTicket, InvalidEntryTimestamp},
    form_token::{extract_tokens, FormTokens, MalformedPage},
    USER_AGENT,
};

pub mod page;

pub use page::VehicleRecord;

/// Text only present on the login form.
pub const LOGIN_MARKER: &str = "로그인";

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("request failed - {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    MalformedPage(#[from] MalformedPage),
    #[error(transparent)]
    EntryTimestamp(#[from] InvalidEntryTimestamp),
    #[error("login was rejected")]
    LoginRejected,
}

/// Why a settlement did not happen. The message is what the car owner gets to read.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("주차 정산 시스템에 로그인 할 수 없습니다.")]
    Login(#[source] PortalError),
    #[error("차량이 존재하지 않거나 / 동일한 번호가 존재합니다.")]
    VehicleNotFound,
    #[error("차량이 존재하지 않거나 / 동일한 번호가 존재합니다.")]
    AmbiguousVehicle(usize),
    #[error("{0}의 차량번호는 이미 할인이 적용되었습니다.")]
    AlreadyApplied(String),
    #[error("자동으로 주차 정산을 할 수 없는 차량입니다.")]
    CannotAutoSettle(String),
    #[error("조회 중 오류 발생: {0}")]
    Lookup(#[source] PortalError),
}

/// Tickets redeemed for one vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub plate: String,
    pub parking_time: String,
    pub applied: Vec<DiscountTicket>,
    pub failed: Vec<DiscountTicket>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedemptionPolicy {
    /// Pause between two redemptions of the same vehicle.
    pub interval: Duration,
}

impl Default for RedemptionPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

#[async_trait]
pub trait Settle: Send + Sync {
    /// Applies the discount tickets `plate` needs.
    async fn get_car_info(&self, plate: &str) -> Result<Settlement, SettlementError>;
}

#[derive(Debug, Clone)]
struct Endpoints {
    login: Url,
    search: Url,
    detail: Url,
}

impl Endpoints {
    fn new(base_url: &Url) -> anyhow::Result<Self> {
        let mut base_url = base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            login: base_url
                .join("User/Login.aspx")
                .context("Failed to build login url")?,
            search: base_url
                .join("Car/SearchResult.aspx")
                .context("Failed to build search url")?,
            detail: base_url
                .join("Car/SearchDetail.aspx")
                .context("Failed to build detail url")?,
        })
    }
}

/// Entry point to the parking portal. Every settlement runs on a session of its own.
pub struct Portal {
    config: PortalConfig,
    endpoints: Endpoints,
    clock: fn() -> chrono::NaiveDateTime,
}

impl Portal {
    pub fn new(config: PortalConfig) -> anyhow::Result<Self> {
        let endpoints = Endpoints::new(&config.base_url)?;
        Ok(Self {
            config,
            endpoints,
            clock: crate::portal_now,
        })
    }

    /// Replaces the clock deciding whether a long stay started today.
    pub fn with_clock(mut self, clock: fn() -> chrono::NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn open_session(&self) -> Result<Session, PortalError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar)
            .user_agent(USER_AGENT)
            .timeout(self.config.timeout)
            .build()?;

        Ok(Session {
            client,
            endpoints: self.endpoints.clone(),
        })
    }
}

#[async_trait]
impl Settle for Portal {
    async fn get_car_info(&self, plate: &str) -> Result<Settlement, SettlementError> {
        let session = self
            .open_session()
            .map_err(SettlementError::Login)?
            .login(&self.config.username, &self.config.password)
            .await
            .map_err(|e| {
                error!("Failed to login - {e}");
                SettlementError::Login(e)
            })?;

        let vehicle = session.lookup(plate).await?;

        if session
            .check_already_applied(&vehicle.plate)
            .await
            .map_err(SettlementError::Lookup)?
        {
            info!("Discount was already applied to {}", vehicle.plate);
            return Err(SettlementError::AlreadyApplied(vehicle.plate));
        }

        let tickets = allocate(&vehicle.parking_time, &vehicle.entered_at, (self.clock)())
            .map_err(|e| SettlementError::Lookup(e.into()))?;
        if tickets.is_empty() {
            warn!(
                "{} parked for {} since {} needs manual settlement",
                vehicle.plate, vehicle.parking_time, vehicle.entered_at
            );
            return Err(SettlementError::CannotAutoSettle(vehicle.plate));
        }

        let (applied, failed) = session
            .redeem_all(&vehicle.plate, &tickets, self.config.redemption)
            .await;

        Ok(Settlement {
            plate: vehicle.plate,
            parking_time: vehicle.parking_time,
            applied,
            failed,
        })
    }
}

/// Fresh cookie jar that has not logged in yet.
pub struct Session {
    client: Client,
    endpoints: Endpoints,
}

impl Session {
    pub async fn login(
        self,
        username: &str,
        password: &SecureString,
    ) -> Result<AuthenticatedSession, PortalError> {
        info!("Open login page");
        let body = fetch_text(self.client.get(self.endpoints.login.clone())).await?;
        let tokens = tokens_of(&body)?;

        let mut form = tokens.fields().to_vec();
        form.extend([
            ("ctl00$cph_body$userId", username),
            ("ctl00$cph_body$userPw", password.unsecure()),
            ("ctl00$cph_body$hiddenPw", ""),
            ("ctl00$cph_body$btnLogin", ""),
        ]);

        info!("Try login as {username}");
        let body = fetch_text(self.client.post(self.endpoints.login.clone()).form(&form)).await?;
        if page::is_login_page(&body) {
            return Err(PortalError::LoginRejected);
        }

        Ok(AuthenticatedSession {
            client: self.client,
            endpoints: self.endpoints,
        })
    }
}

/// Session holding the login cookies of the portal.
pub struct AuthenticatedSession {
    client: Client,
    endpoints: Endpoints,
}

impl AuthenticatedSession {
    /// Lists every vehicle the portal matches with `plate`.
    pub async fn search(&self, plate: &str) -> Result<Vec<VehicleRecord>, PortalError> {
        info!("Search vehicle {plate}");
        let body = fetch_text(
            self.client
                .get(self.endpoints.search.clone())
                .query(&[("carno", plate)]),
        )
        .await?;

        Ok(page::parse_vehicle_cards(&Html::parse_document(&body)))
    }

    /// Finds the single vehicle matching `plate`.
    pub async fn lookup(&self, plate: &str) -> Result<VehicleRecord, SettlementError> {
        let mut vehicles = self.search(plate).await.map_err(SettlementError::Lookup)?;
        match vehicles.len() {
            0 => Err(SettlementError::VehicleNotFound),
            1 => Ok(vehicles.remove(0)),
            count => {
                warn!("{count} vehicles match {plate}");
                Err(SettlementError::AmbiguousVehicle(count))
            }
        }
    }

    async fn detail_page(&self, plate: &str) -> Result<String, PortalError> {
        fetch_text(
            self.client
                .get(self.endpoints.detail.clone())
                .query(&[("carno", plate)]),
        )
        .await
    }

    pub async fn check_already_applied(&self, plate: &str) -> Result<bool, PortalError> {
        let body = self.detail_page(plate).await?;

        Ok(page::has_discount_history(&Html::parse_document(&body)))
    }

    /// Redeems one ticket on the detail page of `plate`, using tokens of a page fetched
    /// right before the submission.
    pub async fn redeem(&self, plate: &str, ticket: DiscountTicket) -> Result<(), PortalError> {
        let body = self.detail_page(plate).await?;
        let tokens = tokens_of(&body)?;

        let event_target = format!(
            "ctl00$cph_body$rptList$ctl{:02}$btnIns",
            ticket.index()
        );
        let mut form = vec![
            ("__EVENTTARGET", event_target.as_str()),
            ("__EVENTARGUMENT", ""),
        ];
        form.extend(tokens.fields());
        form.push(("ctl00$cph_body$Text1", ""));

        self.client
            .post(self.endpoints.detail.clone())
            .query(&[("carno", plate)])
            .form(&form)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    /// Redeems `tickets` in order and returns the applied and the failed ones. A failure
    /// does not stop the remaining tickets.
    pub async fn redeem_all(
        &self,
        plate: &str,
        tickets: &[DiscountTicket],
        policy: RedemptionPolicy,
    ) -> (Vec<DiscountTicket>, Vec<DiscountTicket>) {
        let mut applied = Vec::with_capacity(tickets.len());
        let mut failed = Vec::new();

        for (idx, ticket) in tickets.iter().copied().enumerate() {
            if idx > 0 {
                tokio::time::sleep(policy.interval).await;
            }
            match self.redeem(plate, ticket).await {
                Ok(()) => {
                    info!("Redeemed {ticket} ({}) for {plate}", ticket.price_label());
                    applied.push(ticket);
                }
                Err(e) => {
                    error!("Failed to redeem {ticket} for {plate} - {e}");
                    failed.push(ticket);
                }
            }
        }

        (applied, failed)
    }
}

async fn fetch_text(request: reqwest::RequestBuilder) -> Result<String, PortalError> {
    Ok(request.send().await?.error_for_status()?.text().await?)
}

fn tokens_of(body: &str) -> Result<FormTokens, MalformedPage> {
    extract_tokens(&Html::parse_document(body))
}
