#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{status_code} status code: {body}")]
    Status { status_code: u16, body: String },
    #[error("network: {0}")]
    Network(#[from] reqwest::Error),
}

impl ServerError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ServerError::Status { status_code, .. } => Some(*status_code),
            ServerError::Network(err) => err.status().map(|status| status.as_u16()),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ServerError::Network(err) if err.is_timeout())
    }
}

/// Turn a non-2xx response into a [`ServerError`] carrying its body.
pub async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, ServerError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(ServerError::Status {
            status_code: status.as_u16(),
            body,
        });
    }
    Ok(res)
}

#[cfg(test)]
pub(crate) mod testing {
    use tokio::net::TcpListener;

    /// Base URL of a listener that accepts connections and never answers.
    pub async fn unresponsive_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                open.push(stream);
            }
        });
        format!("http://{}", addr)
    }
}
