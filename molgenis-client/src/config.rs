use std::time::Duration;

use url::Url;

use crate::error::Result;

/// Path of the REST API relative to the server root.
const API_PATH: &str = "api/v1/";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root of the REST API, always ending in `api/v1/`.
    pub api_url: Url,
    pub username: String,
    pub password: String,
    pub verbose: bool,
    pub warnings: bool,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Columns never carried forward from existing rows by `update_rows`.
    pub merge_exclusions: Vec<String>,
}

impl ClientConfig {
    pub fn new(
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let server_str = server.into();
        let base_url = if server_str.starts_with("http://") || server_str.starts_with("https://")
        {
            server_str
        } else {
            format!("https://{}", server_str)
        };

        let mut api_url = Url::parse(&base_url)?;
        if !api_url.path().ends_with('/') {
            api_url.set_path(&format!("{}/", api_url.path()));
        }
        api_url.set_path(&format!("{}{}", api_url.path(), API_PATH));

        Ok(Self {
            api_url,
            username: username.into(),
            password: password.into(),
            verbose: true,
            warnings: true,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            merge_exclusions: Vec::new(),
        })
    }

    pub fn builder(
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> ClientConfigBuilder {
        ClientConfigBuilder::new(server, username, password)
    }
}

pub struct ClientConfigBuilder {
    server: String,
    username: String,
    password: String,
    verbose: bool,
    warnings: bool,
    timeout: Duration,
    connect_timeout: Duration,
    merge_exclusions: Vec<String>,
}

impl ClientConfigBuilder {
    pub fn new(
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            username: username.into(),
            password: password.into(),
            verbose: true,
            warnings: true,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            merge_exclusions: Vec::new(),
        }
    }

    /// Log successful operations at info level.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Emit non-fatal warnings for unexpected statuses, truncated pages and ignored ids.
    pub fn warnings(mut self, warnings: bool) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn merge_exclusion(mut self, column: impl Into<String>) -> Self {
        self.merge_exclusions.push(column.into());
        self
    }

    pub fn merge_exclusions<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.merge_exclusions
            .extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        let mut config = ClientConfig::new(self.server, self.username, self.password)?;
        config.verbose = self.verbose;
        config.warnings = self.warnings;
        config.timeout = self.timeout;
        config.connect_timeout = self.connect_timeout;
        config.merge_exclusions = self.merge_exclusions;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case::bare_host("molgenis.example.org", "https://molgenis.example.org/api/v1/")]
    #[case::http_scheme("http://localhost:8080", "http://localhost:8080/api/v1/")]
    #[case::trailing_slash("https://molgenis.example.org/", "https://molgenis.example.org/api/v1/")]
    #[case::sub_path("https://example.org/molgenis", "https://example.org/molgenis/api/v1/")]
    fn test_api_url_normalization(#[case] server: &str, #[case] expected: &str) {
        let config = ClientConfig::new(server, "admin", "admin").unwrap();
        assert_eq!(config.api_url.as_str(), expected);
    }

    #[test]
    fn test_builder_overrides_defaults() {
        let config = ClientConfig::builder("localhost", "admin", "secret")
            .verbose(false)
            .warnings(false)
            .timeout(Duration::from_secs(5))
            .merge_exclusion("previous_individuals")
            .merge_exclusions(["notes"])
            .build()
            .unwrap();

        assert!(!config.verbose);
        assert!(!config.warnings);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.merge_exclusions, ["previous_individuals", "notes"]);
        assert_eq!(config.password, "secret");
    }

    #[test]
    fn test_invalid_server_url() {
        assert!(ClientConfig::new("http://", "admin", "admin").is_err());
    }
}
