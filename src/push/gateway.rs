use async_trait::async_trait;
use error_stack::{Report, Result, ResultExt};
use reqwest::StatusCode;
use serde::Serialize;
use url::Url;

use super::{Message, PushError, Pusher};
use crate::config;
use crate::schema::PushSubscription;
use crate::util::Sensitive;

/// Delivers messages through an HTTP push gateway which speaks the
/// Web Push protocol to the browser vendors on our behalf.
#[derive(Debug, Clone)]
pub struct GatewayPusher {
    client: reqwest::Client,
    url: Url,
    api_key: Sensitive<String>,
    ttl_secs: u64,
}

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    subscription: GatewaySubscription<'a>,
    payload: &'a Message,
    ttl: u64,
}

#[derive(Debug, Serialize)]
struct GatewaySubscription<'a> {
    endpoint: &'a str,
    keys: GatewayKeys<'a>,
}

#[derive(Debug, Serialize)]
struct GatewayKeys<'a> {
    p256dh: &'a str,
    auth: &'a str,
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid push gateway configuration")]
pub struct GatewayConfigError;

impl GatewayPusher {
    pub fn new(cfg: &config::Push) -> Result<Self, GatewayConfigError> {
        let url = Url::parse(&cfg.gateway_url).change_context(GatewayConfigError)?;
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .user_agent(concat!("whisperline/", env!("CARGO_PKG_VERSION")))
            .build()
            .change_context(GatewayConfigError)
            .attach_printable("could not build HTTP client")?;

        Ok(Self {
            client,
            url,
            api_key: cfg.api_key.clone(),
            ttl_secs: cfg.ttl().as_secs(),
        })
    }

    fn classify(status: StatusCode) -> std::result::Result<(), PushError> {
        match status {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(PushError::Gone),
            status => Err(PushError::Rejected(status.as_u16())),
        }
    }
}

#[async_trait]
impl Pusher for GatewayPusher {
    #[tracing::instrument(skip_all, name = "push.gateway.send", fields(subscription.id = %subscription.id))]
    async fn push(
        &self,
        subscription: &PushSubscription,
        message: &Message,
    ) -> Result<(), PushError> {
        let request = GatewayRequest {
            subscription: GatewaySubscription {
                endpoint: subscription.endpoint.as_str(),
                keys: GatewayKeys {
                    p256dh: subscription.key_p256dh.as_str(),
                    auth: subscription.key_auth.as_str(),
                },
            },
            payload: message,
            ttl: self.ttl_secs,
        };

        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(self.api_key.as_str())
            .json(&request)
            .send()
            .await
            .change_context(PushError::Transport)?;

        let status = response.status();
        Self::classify(status)
            .map_err(Report::new)
            .attach_printable_lazy(|| format!("gateway answered {status}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(GatewayPusher::classify(StatusCode::CREATED), Ok(()));
        assert_eq!(GatewayPusher::classify(StatusCode::GONE), Err(PushError::Gone));
        assert_eq!(GatewayPusher::classify(StatusCode::NOT_FOUND), Err(PushError::Gone));
        assert_eq!(
            GatewayPusher::classify(StatusCode::TOO_MANY_REQUESTS),
            Err(PushError::Rejected(429))
        );
    }

    #[test]
    fn test_request_shape() {
        let message = Message {
            title: "t".into(),
            body: "b".into(),
            data: super::super::MessageData {
                notification_id: Some("1".into()),
                post_id: Some("2".into()),
                comment_id: None,
                kind: "reply_to_post".into(),
                url: "/posts/2".into(),
            },
        };
        let request = GatewayRequest {
            subscription: GatewaySubscription {
                endpoint: "https://push.example/abc",
                keys: GatewayKeys {
                    p256dh: "key",
                    auth: "auth",
                },
            },
            payload: &message,
            ttl: 60,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "subscription": {
                    "endpoint": "https://push.example/abc",
                    "keys": { "p256dh": "key", "auth": "auth" },
                },
                "payload": {
                    "title": "t",
                    "body": "b",
                    "data": {
                        "notification_id": "1",
                        "post_id": "2",
                        "comment_id": null,
                        "type": "reply_to_post",
                        "url": "/posts/2",
                    },
                },
                "ttl": 60,
            })
        );
    }
}
