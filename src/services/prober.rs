// src/services/prober.rs

//! Availability prober.
//!
//! Judges a rendered product page by its purchase controls:
//!
//! 1. No primary button: unavailable.
//! 2. Button text carries an out-of-stock marker: unavailable, whatever
//!    the `disabled` attribute says.
//! 3. Button asks for a size: available iff some size button is enabled.
//! 4. Otherwise: available iff the button is enabled.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::models::{AvailabilityState, Config, ProductId, SelectorConfig};
use crate::services::inspector::{Document, Element, PageInspector};

const DISABLED: &str = "disabled";
const DATA_DISABLED: &str = "data-disabled";

/// Service for probing one product page.
pub struct AvailabilityProber {
    inspector: Arc<dyn PageInspector>,
    selectors: SelectorConfig,
    url_template: String,
    timeout: Duration,
}

impl AvailabilityProber {
    pub fn new(
        inspector: Arc<dyn PageInspector>,
        selectors: SelectorConfig,
        url_template: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            inspector,
            selectors,
            url_template: url_template.into(),
            timeout,
        }
    }

    /// Create a prober from the application configuration.
    pub fn from_config(inspector: Arc<dyn PageInspector>, config: &Config) -> Self {
        Self::new(
            inspector,
            config.selectors.clone(),
            config.target.url_template.clone(),
            config.monitor.render_timeout(),
        )
    }

    /// Render the product page and judge it.
    ///
    /// Fails only when the page cannot be rendered or a selector is
    /// invalid; the document is released either way.
    pub async fn probe(&self, product_id: &ProductId) -> Result<AvailabilityState> {
        let url = product_id.url(&self.url_template);
        log::info!("Opening page: {}", url);

        let document = self.inspector.open(&url, self.timeout).await?;
        let verdict = self.judge(&document);
        self.inspector.close(document);
        verdict
    }

    /// Apply the decision rules to an already rendered page.
    pub fn judge(&self, document: &Document) -> Result<AvailabilityState> {
        let Some(button) = document.query_selector(&self.selectors.primary_action)? else {
            log::warn!(
                "Primary button '{}' not found on {}",
                self.selectors.primary_action,
                document.url()
            );
            return Ok(AvailabilityState::Unavailable);
        };

        let text = button.text();
        let disabled = button.has_attribute(DISABLED);
        log::info!("Button text: '{}' | disabled: {}", text, disabled);

        if contains_any(&text, &self.selectors.out_of_stock_markers) {
            return Ok(AvailabilityState::Unavailable);
        }

        if contains_any(&text, &self.selectors.variant_prompt_markers) {
            return self.judge_variants(document);
        }

        Ok(if disabled {
            AvailabilityState::Unavailable
        } else {
            AvailabilityState::Available
        })
    }

    fn judge_variants(&self, document: &Document) -> Result<AvailabilityState> {
        let Some(container) = self.find_variant_container(document)? else {
            log::warn!("Size selector not found on {}", document.url());
            return Ok(AvailabilityState::Unavailable);
        };

        let variants = container.query_selector_all(&self.selectors.variant_control)?;
        let enabled = variants.iter().filter(|v| is_selectable(v)).count();
        log::debug!("{} of {} sizes selectable", enabled, variants.len());

        Ok(if enabled > 0 {
            AvailabilityState::Available
        } else {
            AvailabilityState::Unavailable
        })
    }

    fn find_variant_container<'a>(&self, document: &'a Document) -> Result<Option<Element<'a>>> {
        for selector in &self.selectors.variant_containers {
            if let Some(container) = document.query_selector(selector)? {
                return Ok(Some(container));
            }
        }
        Ok(None)
    }
}

fn contains_any(text: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| !m.is_empty() && text.contains(m.as_str()))
}

fn is_selectable(variant: &Element<'_>) -> bool {
    !variant.has_attribute(DISABLED) && !variant.has_attribute(DATA_DISABLED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::inspector::{InMemoryInspector, ScriptedPage};

    const TEMPLATE: &str = "https://shop.example/ru/products/{product_id}";
    const URL: &str = "https://shop.example/ru/products/555";

    fn prober_for(inspector: Arc<InMemoryInspector>) -> AvailabilityProber {
        AvailabilityProber::new(
            inspector,
            SelectorConfig::default(),
            TEMPLATE,
            Duration::from_secs(30),
        )
    }

    fn judge(html: &str) -> AvailabilityState {
        let inspector = Arc::new(InMemoryInspector::new());
        let prober = prober_for(inspector);
        prober.judge(&Document::parse(URL, html)).unwrap()
    }

    #[test]
    fn test_missing_primary_button_is_unavailable() {
        assert_eq!(
            judge(r#"<main><button class="btn">Buy</button></main>"#),
            AvailabilityState::Unavailable
        );
    }

    #[test]
    fn test_out_of_stock_marker_wins_over_enabled_button() {
        for text in ["Нет в наличии", "Not available", "Out of stock"] {
            let html = format!(r#"<button class="btn btn-lg">{text}</button>"#);
            assert_eq!(judge(&html), AvailabilityState::Unavailable, "{text}");
        }
    }

    #[test]
    fn test_out_of_stock_marker_with_disabled_button() {
        assert_eq!(
            judge(r#"<button class="btn-lg" disabled>Out of stock</button>"#),
            AvailabilityState::Unavailable
        );
    }

    #[test]
    fn test_out_of_stock_marker_is_case_sensitive() {
        assert_eq!(
            judge(r#"<button class="btn-lg">OUT OF STOCK</button>"#),
            AvailabilityState::Available
        );
    }

    #[test]
    fn test_plain_button_enabled_is_available() {
        assert_eq!(
            judge(r#"<button class="btn-lg">В корзину</button>"#),
            AvailabilityState::Available
        );
    }

    #[test]
    fn test_plain_button_disabled_is_unavailable() {
        assert_eq!(
            judge(r#"<button class="btn-lg" disabled="disabled">В корзину</button>"#),
            AvailabilityState::Unavailable
        );
    }

    #[test]
    fn test_size_prompt_with_one_enabled_size() {
        let html = r#"
            <div class="purchase-card__sizes">
                <button disabled>S</button>
                <button data-disabled="true">M</button>
                <button>L</button>
            </div>
            <button class="btn-lg" disabled>Выберите размер</button>
        "#;
        assert_eq!(judge(html), AvailabilityState::Available);
    }

    #[test]
    fn test_size_prompt_with_no_enabled_size() {
        let html = r#"
            <div class="purchase-card__sizes">
                <button disabled>S</button>
                <button data-disabled="">M</button>
                <button disabled data-disabled="true">L</button>
            </div>
            <button class="btn-lg">Select size</button>
        "#;
        assert_eq!(judge(html), AvailabilityState::Unavailable);
    }

    #[test]
    fn test_size_prompt_with_empty_container() {
        let html = r#"
            <div class="purchase-card__sizes"></div>
            <button class="btn-lg">Select size</button>
        "#;
        assert_eq!(judge(html), AvailabilityState::Unavailable);
    }

    #[test]
    fn test_size_prompt_falls_back_to_group_container() {
        let html = r#"
            <div role="group"><button>XL</button></div>
            <button class="btn-lg">Select size</button>
        "#;
        assert_eq!(judge(html), AvailabilityState::Available);
    }

    #[test]
    fn test_size_prompt_without_container_is_unavailable() {
        let html = r#"
            <div class="sizes"><button>XL</button></div>
            <button class="btn-lg">Select size</button>
        "#;
        assert_eq!(judge(html), AvailabilityState::Unavailable);
    }

    #[tokio::test]
    async fn test_probe_releases_document() {
        let inspector = Arc::new(
            InMemoryInspector::new()
                .with_page(URL, r#"<button class="btn-lg">В корзину</button>"#),
        );
        let prober = prober_for(Arc::clone(&inspector));

        let state = prober.probe(&ProductId::new("555")).await.unwrap();

        assert_eq!(state, AvailabilityState::Available);
        assert_eq!(inspector.opened(), 1);
        assert_eq!(inspector.closed(), 1);
    }

    #[tokio::test]
    async fn test_probe_releases_document_on_invalid_selector() {
        let inspector = Arc::new(
            InMemoryInspector::new()
                .with_page(URL, r#"<button class="btn-lg">В корзину</button>"#),
        );
        let selectors = SelectorConfig {
            primary_action: "[[invalid".to_string(),
            ..SelectorConfig::default()
        };
        let prober = AvailabilityProber::new(
            Arc::clone(&inspector) as Arc<dyn PageInspector>,
            selectors,
            TEMPLATE,
            Duration::from_secs(30),
        );

        let err = prober.probe(&ProductId::new("555")).await.unwrap_err();

        assert!(matches!(err, AppError::Selector { .. }));
        assert!(!err.is_transient());
        assert_eq!(inspector.closed(), 1);
    }

    #[tokio::test]
    async fn test_probe_propagates_render_failure() {
        let inspector = Arc::new(InMemoryInspector::new().script(
            URL,
            [ScriptedPage::RenderFailure("connection refused".into())],
        ));
        let prober = prober_for(Arc::clone(&inspector));

        let err = prober.probe(&ProductId::new("555")).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(inspector.closed(), 0);
    }
}
