use crate::plugin::ChannelPlugin;
use crate::{NotificationChannel, SendReceipt};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use vitalmon_common::types::AlertNotice;

const MAX_ATTEMPTS: u32 = 3;

pub struct WebhookChannel {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl WebhookChannel {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout_secs,
        }
    }

    fn render_body(notice: &AlertNotice) -> String {
        serde_json::json!({
            "instance_id": notice.instance_id,
            "rule_id": notice.rule_id,
            "rule_name": notice.rule_name,
            "tenant_id": notice.tenant_id,
            "org_id": notice.org_id,
            "device_id": notice.device_id,
            "signal": notice.signal,
            "level": notice.level.to_string(),
            "escalation": notice.escalation,
            "message": notice.message,
            "value": notice.value,
            "occurrence_count": notice.occurrence_count,
            "created_at": notice.created_at.to_rfc3339(),
        })
        .to_string()
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, notice: &AlertNotice, recipients: &[String]) -> Result<SendReceipt> {
        let body = Self::render_body(notice);
        let mut receipt = SendReceipt {
            delivered: 0,
            failed: 0,
            retry_count: 0,
        };

        for url in recipients {
            let mut delivered = false;
            for attempt in 0..MAX_ATTEMPTS {
                match self
                    .client
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .timeout(std::time::Duration::from_secs(self.timeout_secs))
                    .body(body.clone())
                    .send()
                    .await
                {
                    Ok(resp) if resp.status().is_success() => {
                        delivered = true;
                        break;
                    }
                    Ok(resp) => {
                        tracing::warn!(
                            attempt = attempt + 1,
                            status = %resp.status(),
                            "Webhook returned non-success status, retrying"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            attempt = attempt + 1,
                            error = %e,
                            "Webhook send failed, retrying"
                        );
                    }
                }
                if attempt < MAX_ATTEMPTS - 1 {
                    receipt.retry_count += 1;
                    tokio::time::sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt)))
                        .await;
                }
            }
            if delivered {
                receipt.delivered += 1;
            } else {
                tracing::error!(url = %url, "Webhook failed after {MAX_ATTEMPTS} attempts");
                receipt.failed += 1;
            }
        }

        Ok(receipt)
    }

    fn channel_type(&self) -> &str {
        "webhook"
    }
}

// Plugin

#[derive(Deserialize)]
struct WebhookConfig {
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

pub struct WebhookPlugin;

impl ChannelPlugin for WebhookPlugin {
    fn name(&self) -> &str {
        "webhook"
    }

    fn recipient_type(&self) -> &str {
        "webhook_url"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        serde_json::from_value::<WebhookConfig>(config.clone())
            .map_err(|e| anyhow::anyhow!("Invalid webhook config: {e}"))?;
        Ok(())
    }

    fn create_channel(&self, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg: WebhookConfig = serde_json::from_value(config.clone())
            .map_err(|e| anyhow::anyhow!("Invalid webhook config: {e}"))?;
        Ok(Box::new(WebhookChannel::new(cfg.timeout_secs)))
    }
}
