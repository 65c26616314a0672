use std::time::Duration;

use chrono::NaiveDate;
use framework::exception;
use framework::exception::CoreRsResult;
use framework::exception::error_code;
use framework::http::HttpClient;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use tracing::warn;

use crate::record::FileRecord;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Default)]
pub struct Search<'a> {
    pub columns: Option<&'a str>,
    pub key: Option<&'a str>,
    pub val: Option<&'a str>,
    pub add: Option<&'a str>,
    pub utd: Option<NaiveDate>,
    pub utd2: Option<NaiveDate>,
    pub inst: Option<&'a str>,
    pub level: Option<u8>,
}

#[derive(Debug)]
pub struct Update<'a> {
    pub columns: &'a str,
    pub key: &'a str,
    pub update_val: &'a str,
    pub val: &'a str,
    pub add: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: i64,
    #[serde(default)]
    data: Value,
}

/// Client of the archive status API. Every call fails soft, errors are logged and
/// surface as an empty search result or a `false` update.
pub struct ArchiveClient {
    http: HttpClient,
    site: String,
}

impl ArchiveClient {
    pub fn new(site: &str, timeout: Duration) -> CoreRsResult<Self> {
        Ok(ArchiveClient {
            http: HttpClient::new(timeout)?,
            site: site.to_owned(),
        })
    }

    pub async fn search(&self, search: &Search<'_>) -> Vec<FileRecord> {
        let utd = search.utd.map(|date| date.format(DATE_FORMAT).to_string());
        let utd2 = search.utd2.map(|date| date.format(DATE_FORMAT).to_string());
        let level = search.level.map(|level| level.to_string());
        let params = [
            ("search", Some("GENERAL")),
            ("columns", search.columns),
            ("key", search.key),
            ("val", search.val),
            ("add", search.add),
            ("utd", utd.as_deref()),
            ("utd2", utd2.as_deref()),
            ("inst", search.inst),
            ("level", level.as_deref()),
        ];

        match self.request(&params).await {
            Ok(Value::Array(rows)) => rows
                .into_iter()
                .filter_map(|row| if let Value::Object(columns) = row { Some(FileRecord::from(columns)) } else { None })
                .collect(),
            Ok(Value::Null) => vec![],
            Ok(data) => {
                warn!(code = error_code::API_ERROR, "unexpected search data, data={data}");
                vec![]
            }
            Err(e) => {
                info!("NO RESULTS from query, error={}", e.message);
                vec![]
            }
        }
    }

    pub async fn update(&self, update: &Update<'_>) -> bool {
        let params = [
            ("update", Some("GENERAL")),
            ("columns", Some(update.columns)),
            ("key", Some(update.key)),
            ("update_val", Some(update.update_val)),
            ("val", Some(update.val)),
            ("add", update.add),
        ];
        self.log_update(update.val, update.columns, &params).await
    }

    pub async fn mark_deleted(&self, koaid: &str) -> bool {
        let params = [("update", Some("MARKDELETED")), ("val", Some(koaid))];
        self.log_update(koaid, "SOURCE_DELETED", &params).await
    }

    pub async fn mark_archived(&self, column: &str, koaid: &str, archive_dir: &str, level: u8) -> bool {
        info!(koaid, "setting archive_dir, archive_dir={archive_dir}");
        let add = format!(" LEVEL={level}");
        self.update(&Update {
            columns: column,
            key: "koaid",
            update_val: archive_dir,
            val: koaid,
            add: Some(&add),
        })
        .await
    }

    /// Number of files in the date range not yet deleted from the source, any status.
    pub async fn count_undeleted(&self, deleted_column: &str, utd: NaiveDate, utd2: NaiveDate) -> usize {
        self.search(&Search {
            columns: Some("koaid"),
            key: Some(deleted_column),
            val: Some("0"),
            utd: Some(utd),
            utd2: Some(utd2),
            ..Search::default()
        })
        .await
        .len()
    }

    async fn log_update(&self, koaid: &str, column: &str, params: &[(&str, Option<&str>)]) -> bool {
        match self.request(params).await {
            Ok(_) => {
                info!(koaid, "{column} set");
                true
            }
            Err(e) => {
                warn!(koaid, "{column} not set, error={}", e.message);
                false
            }
        }
    }

    // returns the data of a response with success=1
    async fn request(&self, params: &[(&str, Option<&str>)]) -> CoreRsResult<Value> {
        let params = params
            .iter()
            .filter_map(|(key, value)| value.filter(|value| !value.is_empty()).map(|value| (*key, value)));
        let url = Url::parse_with_params(&self.site, params).map_err(|err| {
            exception!(
                code = error_code::API_ERROR,
                message = format!("invalid api url, site={}", self.site),
                source = err
            )
        })?;
        info!(url = %url, "query archive api");

        let response = self.http.get(url).await?;
        if !response.is_success() {
            return Err(exception!(
                code = error_code::API_ERROR,
                message = format!("api request failed, status={}", response.status)
            ));
        }
        let response: ApiResponse = serde_json::from_str(&response.body).map_err(|err| {
            exception!(
                code = error_code::API_ERROR,
                message = "failed to parse api response",
                source = err
            )
        })?;
        if response.success != 1 {
            return Err(exception!(
                code = error_code::API_ERROR,
                message = format!("api returned success={}", response.success)
            ));
        }
        Ok(response.data)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;

    use super::ArchiveClient;
    use super::Search;

    fn client(server: &MockServer) -> ArchiveClient {
        ArchiveClient::new(&server.url("/koarti_api"), Duration::from_secs(5)).unwrap()
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn search() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/koarti_api")
                .query_param("search", "GENERAL")
                .query_param("columns", "koaid,status")
                .query_param("key", "status")
                .query_param("val", "COMPLETE")
                .query_param("add", "ARCHIVE_DIR IS NULL")
                .query_param("utd", "2021-01-16")
                .query_param("utd2", "2021-01-17")
                .query_param("inst", "KCWI")
                .query_param_missing("level");
            then.status(200).json_body(json!({
                "success": 1,
                "data": [
                    {"koaid": "KB.20210116.57436.94", "status": "COMPLETE"},
                    {"koaid": "KB.20210116.57500.11", "status": "COMPLETE"}
                ]
            }));
        });

        let records = client(&server)
            .search(&Search {
                columns: Some("koaid,status"),
                key: Some("status"),
                val: Some("COMPLETE"),
                add: Some("ARCHIVE_DIR IS NULL"),
                utd: Some(date("2021-01-16")),
                utd2: Some(date("2021-01-17")),
                inst: Some("KCWI"),
                level: None,
            })
            .await;

        mock.assert();
        assert_eq!(records.len(), 2);
        assert_eq!(records.first().and_then(|record| record.koaid()), Some("KB.20210116.57436.94"));
    }

    #[tokio::test]
    async fn search_fails_soft() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).query_param("level", "1");
            then.status(200).json_body(json!({"success": 0, "data": "error in query"}));
        });
        server.mock(|when, then| {
            when.method(GET).query_param("level", "2");
            then.status(200).body("<html>internal error</html>");
        });
        server.mock(|when, then| {
            when.method(GET).query_param("inst", "HIRES");
            then.status(500);
        });
        let client = client(&server);

        for search in [
            Search {
                level: Some(1),
                ..Search::default()
            },
            Search {
                level: Some(2),
                ..Search::default()
            },
            Search {
                inst: Some("HIRES"),
                ..Search::default()
            },
        ] {
            assert!(client.search(&search).await.is_empty());
        }
    }

    #[tokio::test]
    async fn mark_archived() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .query_param("update", "GENERAL")
                .query_param("columns", "archive_dir")
                .query_param("key", "koaid")
                .query_param("update_val", "/koastorage04/KCWI/koadata39/20210116/lev0/")
                .query_param("val", "KB.20210116.57436.94")
                .query_param("add", " LEVEL=0");
            then.status(200).json_body(json!({"success": 1, "data": "1 row updated"}));
        });

        let updated = client(&server)
            .mark_archived(
                "archive_dir",
                "KB.20210116.57436.94",
                "/koastorage04/KCWI/koadata39/20210116/lev0/",
                0,
            )
            .await;

        mock.assert();
        assert!(updated);
    }

    #[tokio::test]
    async fn mark_deleted() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET)
                .query_param("update", "MARKDELETED")
                .query_param("val", "KB.20210116.57436.94");
            then.status(200).json_body(json!({"success": 1, "data": []}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .query_param("update", "MARKDELETED")
                .query_param("val", "KB.20210116.57500.11");
            then.status(200).json_body(json!({"success": 0}));
        });
        let client = client(&server);

        assert!(client.mark_deleted("KB.20210116.57436.94").await);
        assert!(!client.mark_deleted("KB.20210116.57500.11").await);
    }

    #[tokio::test]
    async fn count_undeleted() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET)
                .query_param("columns", "koaid")
                .query_param("key", "source_deleted")
                .query_param("val", "0");
            then.status(200).json_body(json!({
                "success": 1,
                "data": [{"koaid": "KB.20210116.1.1"}, {"koaid": "KB.20210116.1.2"}, {"koaid": "KB.20210116.1.3"}]
            }));
        });

        let count = client(&server)
            .count_undeleted("source_deleted", date("2021-01-16"), date("2021-01-17"))
            .await;

        assert_eq!(count, 3);
    }
}
