use crate::SinkError;
use async_trait::async_trait;
use std::time::Duration;

/// InfluxDB 写入目标。
#[derive(Debug, Clone)]
pub struct InfluxTarget {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

/// 一批 Line Protocol 的提交通道。
#[async_trait]
pub trait LineTransport: Send + Sync {
    async fn send(&self, body: String) -> Result<(), SinkError>;
}

/// 基于 HTTP `/api/v2/write` 的提交通道。
#[derive(Clone)]
pub struct HttpLineTransport {
    client: reqwest::Client,
    write_url: String,
    token: String,
    org: String,
    bucket: String,
}

impl HttpLineTransport {
    pub fn new(target: &InfluxTarget) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| SinkError::Http(err.to_string()))?;
        Ok(Self {
            client,
            write_url: write_url(&target.url),
            token: target.token.clone(),
            org: target.org.clone(),
            bucket: target.bucket.clone(),
        })
    }

    pub fn write_url(&self) -> &str {
        &self.write_url
    }
}

#[async_trait]
impl LineTransport for HttpLineTransport {
    async fn send(&self, body: String) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "s"),
            ])
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.token))
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|err| SinkError::Http(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

fn write_url(base: &str) -> String {
    format!("{}/api/v2/write", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_url_trims_trailing_slash() {
        assert_eq!(
            write_url("https://influx.example.com/"),
            "https://influx.example.com/api/v2/write"
        );
        assert_eq!(write_url("http://localhost:8086"), "http://localhost:8086/api/v2/write");
    }
}
