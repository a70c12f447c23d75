use crate::llm_adapter::LlmAdapter;
use crate::types::{NewsletterDocument, Result, TopicDigest, UserProfile};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// The formatting stage: renders digests into a personalized newsletter
/// with HTML and plain-text variants.
pub struct Formatter {
    llm: Arc<dyn LlmAdapter>,
}

impl Formatter {
    pub fn new(llm: Arc<dyn LlmAdapter>) -> Self {
        Self { llm }
    }

    pub async fn format(
        &self,
        user: &UserProfile,
        digests: Vec<TopicDigest>,
    ) -> Result<NewsletterDocument> {
        let topic_names: Vec<String> = digests.iter().map(|d| d.topic.name.clone()).collect();
        let date = Utc::now().format("%B %d, %Y").to_string();

        let (title, introduction) = if topic_names.is_empty() {
            // Nothing to ask the model about; render the empty-digest fallback.
            (
                "Your News Digest".to_string(),
                format!(
                    "Hello {}, you have no subscribed topics yet, so there are no news sections today.",
                    user.name
                ),
            )
        } else {
            let title = match self.llm.newsletter_title(&user.name, &topic_names).await {
                Ok(title) => title,
                Err(e) => {
                    warn!("title generation failed, using fallback: {}", e);
                    format!("Your News Digest: {}", topic_names.join(", "))
                }
            };

            let introduction = match self
                .llm
                .newsletter_introduction(&user.name, &topic_names)
                .await
            {
                Ok(intro) => intro,
                Err(e) => {
                    warn!("introduction generation failed, using fallback: {}", e);
                    format!(
                        "Hello {}, here is your news summary about {} for today.",
                        user.name,
                        topic_names.join(", ")
                    )
                }
            };

            (title, introduction)
        };

        let subject = format!("{} - {}", title, date);
        let html = render_html(&user.name, &title, &introduction, &date, &digests);
        let text = render_text(&user.name, &title, &introduction, &date, &digests);

        info!(
            "formatted newsletter '{}' with {} topic sections",
            title,
            digests.len()
        );

        Ok(NewsletterDocument {
            title,
            introduction,
            subject,
            digests,
            html,
            text,
        })
    }
}

/// Escape text for safe interpolation into the HTML template.
fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn render_html(
    user_name: &str,
    title: &str,
    introduction: &str,
    date: &str,
    digests: &[TopicDigest],
) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape_html(title)));
    html.push_str(
        "<style>\n\
         body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 800px; margin: 0 auto; padding: 20px; }\n\
         .header { text-align: center; margin-bottom: 30px; }\n\
         .header h1 { color: #2c3e50; margin-bottom: 10px; }\n\
         .date { color: #7f8c8d; font-size: 0.9em; }\n\
         .introduction { font-size: 1.1em; margin-bottom: 30px; padding: 15px; background-color: #f8f9fa; border-left: 4px solid #3498db; }\n\
         .topic { margin-bottom: 40px; }\n\
         .topic-title { color: #2980b9; font-size: 1.4em; border-bottom: 2px solid #3498db; padding-bottom: 10px; }\n\
         .topic-summary { font-style: italic; margin-bottom: 20px; }\n\
         .article { margin-bottom: 25px; padding-bottom: 15px; border-bottom: 1px solid #eee; }\n\
         .article-title { color: #34495e; font-weight: bold; margin-bottom: 5px; }\n\
         .article-relevance { font-size: 0.9em; color: #16a085; margin-bottom: 10px; }\n\
         .article-source { font-size: 0.8em; color: #7f8c8d; }\n\
         .footer { margin-top: 50px; padding-top: 20px; border-top: 1px solid #eee; text-align: center; font-size: 0.9em; color: #7f8c8d; }\n\
         </style>\n</head>\n<body>\n",
    );

    html.push_str(&format!(
        "<div class=\"header\">\n<h1>{}</h1>\n<div class=\"date\">{}</div>\n</div>\n",
        escape_html(title),
        escape_html(date)
    ));
    html.push_str(&format!(
        "<div class=\"introduction\">\n<p>Hello {},</p>\n<p>{}</p>\n</div>\n",
        escape_html(user_name),
        escape_html(introduction)
    ));

    for digest in digests {
        html.push_str("<div class=\"topic\">\n");
        html.push_str(&format!(
            "<h2 class=\"topic-title\">{}</h2>\n",
            escape_html(&digest.topic.name)
        ));
        html.push_str(&format!(
            "<p class=\"topic-summary\">{}</p>\n",
            escape_html(&digest.summary)
        ));

        for item in &digest.articles {
            html.push_str("<div class=\"article\">\n");
            html.push_str(&format!(
                "<div class=\"article-title\">{}</div>\n",
                escape_html(&item.article.title)
            ));
            html.push_str(&format!("<p>{}</p>\n", escape_html(&item.summary)));
            if let Some(relevance) = &item.relevance {
                html.push_str(&format!(
                    "<div class=\"article-relevance\">Relevance: {}</div>\n",
                    escape_html(relevance)
                ));
            }
            html.push_str(&format!(
                "<div class=\"article-source\">Source: {} - <a href=\"{}\" target=\"_blank\">Read more</a></div>\n",
                escape_html(&item.article.source),
                escape_html(&item.article.url)
            ));
            html.push_str("</div>\n");
        }

        html.push_str("</div>\n");
    }

    html.push_str(
        "<div class=\"footer\">\n<p>Thanks for reading your personalized newsletter!</p>\n\
         <p>You receive this digest based on your subscribed interests.</p>\n</div>\n\
         </body>\n</html>\n",
    );

    html
}

fn render_text(
    user_name: &str,
    title: &str,
    introduction: &str,
    date: &str,
    digests: &[TopicDigest],
) -> String {
    let mut text = format!("{}\n{}\n\n", title, date);
    text.push_str(&format!("Hello {},\n\n{}\n\n", user_name, introduction));

    for digest in digests {
        text.push_str(&format!("== {} ==\n", digest.topic.name.to_uppercase()));
        text.push_str(&format!("{}\n\n", digest.summary));

        for (i, item) in digest.articles.iter().enumerate() {
            text.push_str(&format!("{}. {}\n", i + 1, item.article.title));
            text.push_str(&format!("   {}\n", item.summary));
            if let Some(relevance) = &item.relevance {
                text.push_str(&format!("   Relevance: {}\n", relevance));
            }
            text.push_str(&format!(
                "   Source: {} - {}\n\n",
                item.article.source, item.article.url
            ));
        }

        text.push('\n');
    }

    text.push_str("Thanks for reading your personalized newsletter!\n");
    text.push_str("You receive this digest based on your subscribed interests.\n");

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_metacharacters() {
        assert_eq!(
            escape_html("<b>\"Tom & Jerry\"</b>"),
            "&lt;b&gt;&quot;Tom &amp; Jerry&quot;&lt;/b&gt;"
        );
    }
}
