//! Headline sentiment from a news search RSS feed.
//!
//! Sentiment is a keyword count: each positive phrase found in a title adds
//! one, each negative phrase subtracts one. A phrase counts at most once per
//! title; matching is case-insensitive and on whole words, so "ban" does not
//! match "Bank".

use picks_common::util::truncate_with_ellipsis;
use picks_common::NewsConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PicksError, PicksResult};

/// Headline titles longer than this are shortened for display
const MAX_TITLE_CHARS: usize = 160;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sentiment {
    pub headlines: Vec<Headline>,
    pub net: i32,
}

pub struct NewsScorer {
    http: reqwest::Client,
    config: NewsConfig,
    positive: Vec<Regex>,
    negative: Vec<Regex>,
}

impl NewsScorer {
    pub fn new(http: reqwest::Client, config: NewsConfig) -> Self {
        Self {
            positive: phrase_patterns(&config.positive_keywords),
            negative: phrase_patterns(&config.negative_keywords),
            http,
            config,
        }
    }

    /// Search the feed for `display_name` and score the first titles.
    pub async fn fetch_sentiment(&self, display_name: &str) -> PicksResult<Sentiment> {
        let query = format!("{display_name} stock");
        let response = self
            .http
            .get(&self.config.feed_url)
            .query(&[("q", query.as_str())])
            .query(&self.config.params)
            .send()
            .await
            .map_err(|e| PicksError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PicksError::Upstream {
                endpoint: "news".into(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PicksError::from_reqwest(&e))?;
        let channel = rss::Channel::read_from(&body[..])
            .map_err(|e| PicksError::Parse(format!("news feed: {e}")))?;

        let sentiment = self.score_items(channel.items());
        debug!(
            name = display_name,
            net = sentiment.net,
            headlines = sentiment.headlines.len(),
            "Scored news sentiment"
        );
        Ok(sentiment)
    }

    fn score_items(&self, items: &[rss::Item]) -> Sentiment {
        let items: Vec<&rss::Item> = items
            .iter()
            .filter(|item| item.title().is_some_and(|t| !t.trim().is_empty()))
            .take(self.config.max_titles)
            .collect();

        let net: i32 = items
            .iter()
            .filter_map(|item| item.title())
            .map(|title| self.title_score(title))
            .sum();

        let headlines = items
            .iter()
            .take(self.config.max_headlines)
            .map(|item| Headline {
                title: truncate_with_ellipsis(item.title().unwrap_or_default().trim(), MAX_TITLE_CHARS),
                link: item.link().map(str::to_string),
                published: item.pub_date().map(str::to_string),
            })
            .collect();

        Sentiment { headlines, net }
    }

    /// Positive minus negative phrase hits for one title.
    pub fn title_score(&self, title: &str) -> i32 {
        count_phrases(title, &self.positive) - count_phrases(title, &self.negative)
    }
}

/// One case-insensitive whole-word pattern per phrase. Inner whitespace
/// matches any run of whitespace.
fn phrase_patterns(phrases: &[String]) -> Vec<Regex> {
    phrases
        .iter()
        .map(|p| p.split_whitespace().map(regex::escape).collect::<Vec<_>>())
        .filter(|words| !words.is_empty())
        .filter_map(|words| {
            let pattern = format!(r"(?i)\b{}\b", words.join(r"\s+"));
            match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "Skipping invalid news keyword");
                    None
                }
            }
        })
        .collect()
}

fn count_phrases(title: &str, patterns: &[Regex]) -> i32 {
    patterns.iter().filter(|re| re.is_match(title)).count() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn feed(titles: &[&str]) -> String {
        let items: String = titles
            .iter()
            .enumerate()
            .map(|(i, t)| {
                format!(
                    "<item><title>{t}</title><link>https://news.example/{i}</link>\
                     <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>"
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Search</title><link>https://news.example</link><description>d</description>{items}</channel></rss>"#
        )
    }

    fn scorer(feed_url: String) -> NewsScorer {
        NewsScorer::new(
            reqwest::Client::new(),
            NewsConfig {
                feed_url,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_title_score_counts_each_phrase_once() {
        let scorer = scorer("http://unused".into());
        assert_eq!(scorer.title_score("Shares SURGE, surge again on strong growth"), 3);
        assert_eq!(scorer.title_score("Profit falls after probe"), -2);
        assert_eq!(scorer.title_score("Quarterly results announced"), 0);
        // Mixed: "beats" and "lawsuit"
        assert_eq!(scorer.title_score("Company beats estimates despite lawsuit"), 0);
    }

    #[test]
    fn test_title_score_matches_whole_words_only() {
        let scorer = scorer("http://unused".into());
        assert_eq!(scorer.title_score("HDFC Bank Q2 results announced"), 0);
        assert_eq!(scorer.title_score("Company reports glossy annual report"), 0);
        assert_eq!(scorer.title_score("Regulator lifts ban; shares at RECORD  HIGH"), 0);
        assert_eq!(scorer.title_score("Export ban hits margins"), -1);
        assert_eq!(scorer.title_score("Quarterly loss widens"), -1);
    }

    #[tokio::test]
    async fn test_fetch_sentiment_limits_titles_and_headlines() {
        let server = MockServer::start().await;
        let titles = [
            "Acme beats estimates",
            "Acme shares surge",
            "Acme quarterly update",
            "Acme faces lawsuit",
            "Acme in record high territory",
            "Acme upgrade by broker",
            "Acme order win",
        ];
        Mock::given(method("GET"))
            .and(path("/rss/search"))
            .and(query_param("q", "Acme Ltd stock"))
            .and(query_param("hl", "en-IN"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(feed(&titles))
                    .insert_header("content-type", "application/rss+xml"),
            )
            .mount(&server)
            .await;

        let scorer = scorer(format!("{}/rss/search", server.uri()));
        let sentiment = scorer.fetch_sentiment("Acme Ltd").await.unwrap();

        // Seventh title ("order win") is beyond the six scored.
        assert_eq!(sentiment.net, 1 + 1 + 0 - 1 + 1 + 1);
        assert_eq!(sentiment.headlines.len(), 3);
        assert_eq!(sentiment.headlines[0].title, "Acme beats estimates");
        assert_eq!(
            sentiment.headlines[1].link.as_deref(),
            Some("https://news.example/1")
        );
    }

    #[tokio::test]
    async fn test_feed_error_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let scorer = scorer(format!("{}/rss/search", server.uri()));
        let err = scorer.fetch_sentiment("Acme").await.unwrap_err();
        assert!(matches!(err, PicksError::Upstream { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_invalid_feed_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope"))
            .mount(&server)
            .await;

        let scorer = scorer(format!("{}/rss/search", server.uri()));
        let err = scorer.fetch_sentiment("Acme").await.unwrap_err();
        assert!(matches!(err, PicksError::Parse(_)));
    }
}
