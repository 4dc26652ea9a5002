//! Transactional email for order confirmations and cart recovery.
//!
//! Uses SMTP via lettre for delivery with Askama HTML templates. The service
//! is optional: without SMTP configuration the storefront runs with
//! notifications disabled, and every call site treats send failures as
//! non-fatal.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::SmtpConfig;
use crate::db::orders::{Order, ShippingAddress};

/// One row in an email's item table.
struct EmailLine {
    title: String,
    quantity: u32,
    line_total: String,
}

/// HTML template for the order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    order_ref: &'a str,
    lines: &'a [EmailLine],
    subtotal: String,
    tax: String,
    shipping: String,
    total: String,
    address: Option<&'a ShippingAddress>,
}

/// Plain text template for the order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    order_ref: &'a str,
    lines: &'a [EmailLine],
    subtotal: String,
    tax: String,
    shipping: String,
    total: String,
}

/// HTML template for the abandoned cart reminder.
#[derive(Template)]
#[template(path = "email/abandoned_cart.html")]
struct AbandonedCartHtml<'a> {
    lines: &'a [EmailLine],
    total: String,
    cart_url: &'a str,
}

/// Plain text template for the abandoned cart reminder.
#[derive(Template)]
#[template(path = "email/abandoned_cart.txt")]
struct AbandonedCartText<'a> {
    lines: &'a [EmailLine],
    total: String,
    cart_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A cart line resolved against the catalog for a reminder email.
#[derive(Debug, Clone)]
pub struct ReminderItem {
    pub title: String,
    pub quantity: u32,
    pub line_total: rust_decimal::Decimal,
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    base_url: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &SmtpConfig, base_url: &str) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            base_url: base_url.to_owned(),
        })
    }

    /// Send an order confirmation to the order's customer email.
    ///
    /// # Errors
    ///
    /// Returns error if the email fails to render or send.
    pub async fn send_order_confirmation(&self, order: &Order) -> Result<(), EmailError> {
        let lines: Vec<EmailLine> = order
            .items
            .iter()
            .map(|item| EmailLine {
                title: item.product_title.clone(),
                quantity: item.quantity,
                line_total: format!(
                    "${:.2}",
                    item.unit_price * rust_decimal::Decimal::from(item.quantity)
                ),
            })
            .collect();
        let order_ref = order.id.short().to_uppercase();

        let html = OrderConfirmationHtml {
            order_ref: &order_ref,
            lines: &lines,
            subtotal: format!("${:.2}", order.subtotal),
            tax: format!("${:.2}", order.tax),
            shipping: format!("${:.2}", order.shipping),
            total: format!("${:.2}", order.total),
            address: order.shipping_address.as_ref(),
        }
        .render()?;
        let text = OrderConfirmationText {
            order_ref: &order_ref,
            lines: &lines,
            subtotal: format!("${:.2}", order.subtotal),
            tax: format!("${:.2}", order.tax),
            shipping: format!("${:.2}", order.shipping),
            total: format!("${:.2}", order.total),
        }
        .render()?;

        self.send_multipart_email(
            &order.customer_email,
            &format!("Order Confirmation #{order_ref}"),
            &text,
            &html,
        )
        .await
    }

    /// Send an abandoned-cart reminder.
    ///
    /// # Errors
    ///
    /// Returns error if the email fails to render or send.
    pub async fn send_abandoned_cart(
        &self,
        to: &str,
        items: &[ReminderItem],
    ) -> Result<(), EmailError> {
        let lines: Vec<EmailLine> = items
            .iter()
            .map(|item| EmailLine {
                title: item.title.clone(),
                quantity: item.quantity,
                line_total: format!("${:.2}", item.line_total),
            })
            .collect();
        let total: rust_decimal::Decimal = items.iter().map(|i| i.line_total).sum();
        let cart_url = format!("{}/cart", self.base_url);

        let html = AbandonedCartHtml {
            lines: &lines,
            total: format!("${total:.2}"),
            cart_url: &cart_url,
        }
        .render()?;
        let text = AbandonedCartText {
            lines: &lines,
            total: format!("${total:.2}"),
            cart_url: &cart_url,
        }
        .render()?;

        self.send_multipart_email(to, "You left something in your cart", &text, &html)
            .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_templates_render() {
        let lines = vec![EmailLine {
            title: "Wireless Earbuds Pro".to_owned(),
            quantity: 2,
            line_total: "$159.98".to_owned(),
        }];
        let html = OrderConfirmationHtml {
            order_ref: "A1B2C3D4",
            lines: &lines,
            subtotal: "$159.98".to_owned(),
            tax: "$11.60".to_owned(),
            shipping: "$0.00".to_owned(),
            total: "$171.58".to_owned(),
            address: None,
        }
        .render()
        .unwrap();
        assert!(html.contains("A1B2C3D4"));
        assert!(html.contains("Wireless Earbuds Pro"));
        assert!(html.contains("$171.58"));

        let text = OrderConfirmationText {
            order_ref: "A1B2C3D4",
            lines: &lines,
            subtotal: "$159.98".to_owned(),
            tax: "$11.60".to_owned(),
            shipping: "$0.00".to_owned(),
            total: "$171.58".to_owned(),
        }
        .render()
        .unwrap();
        assert!(text.contains("x2"));
    }

    #[test]
    fn test_abandoned_cart_templates_render() {
        let lines = vec![EmailLine {
            title: "Smart Fitness Watch".to_owned(),
            quantity: 1,
            line_total: "$149.99".to_owned(),
        }];
        let html = AbandonedCartHtml {
            lines: &lines,
            total: "$149.99".to_owned(),
            cart_url: "https://shop.example/cart",
        }
        .render()
        .unwrap();
        assert!(html.contains("https://shop.example/cart"));
    }
}
