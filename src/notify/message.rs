//! Notification message rendering

use chrono::Utc;

use crate::mail::MailMessage;

use super::RecipientDigest;

/// Render the aggregated completion notice for one recipient
pub fn batch_signed_message(
    address: &str,
    digest: &RecipientDigest,
    signer_name: &str,
) -> MailMessage {
    let now = Utc::now();
    let count = digest.items.len();
    let subject = format!("{count} request(s) signed - {}", now.format("%d %b %Y"));

    let mut text_items = String::new();
    let mut html_items = String::new();
    for (index, item) in digest.items.iter().enumerate() {
        text_items.push_str(&format!(
            "{}. {} ({})\n",
            index + 1,
            item.title,
            item.category.label()
        ));
        html_items.push_str(&format!(
            "<li style=\"margin-bottom:8px;\"><strong>{}. {}</strong><br>\
             <small>Category: {}</small></li>\n",
            index + 1,
            item.title,
            item.category.label()
        ));
    }

    let text_body = format!(
        "Hello {name},\n\n\
         Good news! {signer} has signed {count} of your requests:\n\n\
         {items}\n\
         Date: {date}\n\n\
         You can now download the signed documents from the application.\n",
        name = digest.display_name,
        signer = signer_name,
        count = count,
        items = text_items,
        date = now.format("%A, %d %B %Y"),
    );

    let html_body = format!(
        "<html><body style=\"font-family: Arial, sans-serif; color: #333;\">\
         <h2>Requests signed</h2>\
         <p>Hello <strong>{name}</strong>,</p>\
         <p>Good news! <strong>{signer}</strong> has signed {count} of your requests:</p>\
         <ul style=\"padding:0; list-style:none;\">{items}</ul>\
         <p>You can now download the signed documents from the application.</p>\
         <hr><p style=\"font-size:12px; color:#9ca3af;\">\
         Automated message from the digital signing service - {date}.<br>\
         Do not reply to this message.</p>\
         </body></html>",
        name = digest.display_name,
        signer = signer_name,
        count = count,
        items = html_items,
        date = now.format("%A, %d %B %Y"),
    );

    MailMessage {
        to: address.to_string(),
        subject,
        text_body,
        html_body,
    }
}

/// Render a single rejection notice
pub fn rejection_message(
    address: &str,
    recipient_name: &str,
    signer_name: &str,
    title: &str,
    comment: &str,
) -> MailMessage {
    let now = Utc::now();
    let subject = format!("Request rejected - {}", now.format("%d %b %Y"));

    let text_body = format!(
        "Hello {recipient_name},\n\n\
         Your request \"{title}\" was rejected by {signer_name}.\n\n\
         Reason: {comment}\n\n\
         Please revise it in the application.\n",
    );

    let html_body = format!(
        "<html><body style=\"font-family: Arial, sans-serif; color: #333;\">\
         <h2>Request rejected</h2>\
         <p>Hello <strong>{recipient_name}</strong>,</p>\
         <p>Your request <strong>\"{title}\"</strong> was rejected by \
         <strong>{signer_name}</strong>.</p>\
         <div style=\"padding:12px; background:#fef2f2; border-left:4px solid #dc2626;\">\
         <strong>Reason:</strong> {comment}</div>\
         <p>Please revise it in the application.</p>\
         <hr><p style=\"font-size:12px; color:#9ca3af;\">\
         Automated message from the digital signing service - {date}.<br>\
         Do not reply to this message.</p>\
         </body></html>",
        date = now.format("%A, %d %B %Y"),
    );

    MailMessage {
        to: address.to_string(),
        subject,
        text_body,
        html_body,
    }
}
