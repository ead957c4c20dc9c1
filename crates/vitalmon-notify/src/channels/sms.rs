use crate::plugin::ChannelPlugin;
use crate::{NotificationChannel, SendReceipt};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use vitalmon_common::types::AlertNotice;

const MAX_ATTEMPTS: u32 = 3;

/// 短信网关渠道：通过 HTTP 网关发送，网关侧模板与签名由网关自行处理。
pub struct SmsChannel {
    client: reqwest::Client,
    gateway_url: String,
    api_key: String,
}

impl SmsChannel {
    pub fn new(gateway_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway_url,
            api_key,
        }
    }

    fn render_content(notice: &AlertNotice) -> String {
        let prefix = if notice.escalation {
            "【升级】"
        } else {
            "【告警】"
        };
        format!(
            "{prefix}{} 设备 {} {}",
            notice.rule_name, notice.device_id, notice.message
        )
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    async fn send(&self, notice: &AlertNotice, recipients: &[String]) -> Result<SendReceipt> {
        let content = Self::render_content(notice);
        let mut receipt = SendReceipt {
            delivered: 0,
            failed: 0,
            retry_count: 0,
        };

        for phone in recipients {
            let payload = serde_json::json!({
                "phone": phone,
                "content": content,
                "level": notice.level.to_string(),
            });

            let mut delivered = false;
            for attempt in 0..MAX_ATTEMPTS {
                match self
                    .client
                    .post(&self.gateway_url)
                    .bearer_auth(&self.api_key)
                    .json(&payload)
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
                            "SMS gateway returned non-success status, retrying"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            attempt = attempt + 1,
                            error = %e,
                            "SMS gateway request failed, retrying"
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
                tracing::error!(phone = %phone, "SMS failed after {MAX_ATTEMPTS} attempts");
                receipt.failed += 1;
            }
        }

        Ok(receipt)
    }

    fn channel_type(&self) -> &str {
        "sms"
    }
}

// Plugin

#[derive(Deserialize)]
struct SmsConfig {
    gateway_url: String,
    api_key: String,
}

pub struct SmsPlugin;

impl ChannelPlugin for SmsPlugin {
    fn name(&self) -> &str {
        "sms"
    }

    fn recipient_type(&self) -> &str {
        "phone"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        serde_json::from_value::<SmsConfig>(config.clone())
            .map_err(|e| anyhow::anyhow!("Invalid sms config: {e}"))?;
        Ok(())
    }

    fn create_channel(&self, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg: SmsConfig = serde_json::from_value(config.clone())
            .map_err(|e| anyhow::anyhow!("Invalid sms config: {e}"))?;
        Ok(Box::new(SmsChannel::new(cfg.gateway_url, cfg.api_key)))
    }

    fn redact_config(&self, config: &Value) -> Value {
        let mut redacted = config.clone();
        if let Some(obj) = redacted.as_object_mut() {
            if obj.contains_key("api_key") {
                obj.insert("api_key".to_string(), Value::String("***".to_string()));
            }
        }
        redacted
    }
}
