//! HTML email bodies for each notification event.
//!
//! Every event variant has its own render function; `render` dispatches with
//! an exhaustive match so a new event type cannot be added without a
//! template. User-supplied text is escaped before interpolation.

use tradebidz_pipeline::NotificationEvent;

/// A rendered message addressed to a single recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl OutboundEmail {
    fn new(to: &str, subject: impl Into<String>, html: String) -> Self {
        Self {
            to: to.to_string(),
            subject: subject.into(),
            html,
        }
    }
}

/// Render every email an event fans out to, in send order
pub fn render(event: &NotificationEvent) -> Vec<OutboundEmail> {
    match event {
        NotificationEvent::VerifyEmail { email, otp } => vec![verify_email(email, otp)],
        NotificationEvent::ResetPassword { email, otp } => vec![reset_password(email, otp)],
        NotificationEvent::BidPlaced {
            product_name,
            new_price,
            seller_email,
            bidder_email,
            prev_bidder_email,
            ..
        } => bid_placed(
            product_name,
            new_price,
            seller_email,
            bidder_email,
            prev_bidder_email.as_deref(),
        ),
        NotificationEvent::BidRejected {
            bidder_email,
            product_name,
            reason,
        } => vec![bid_rejected(bidder_email, product_name, reason)],
        NotificationEvent::AuctionSuccess {
            seller_email,
            winner_email,
            product_name,
            price,
            seller_name,
            winner_name,
            winner_address,
            ..
        } => auction_success(
            seller_email,
            winner_email,
            product_name,
            price,
            WinnerContact {
                seller_name: seller_name.as_deref(),
                winner_name: winner_name.as_deref(),
                winner_email,
                winner_address: winner_address.as_deref(),
            },
        ),
        NotificationEvent::AuctionFail {
            seller_email,
            product_name,
        } => vec![auction_fail(seller_email, product_name)],
        NotificationEvent::NewQuestion {
            seller_email,
            product_name,
            question,
            product_url,
        } => vec![new_question(seller_email, product_name, question, product_url)],
        NotificationEvent::NewAnswer {
            emails,
            product_name,
            question,
            answer,
        } => emails
            .iter()
            .map(|email| new_answer(email, product_name, question, answer))
            .collect(),
        NotificationEvent::DescriptionUpdate {
            emails,
            product_name,
            description,
            product_url,
        } => emails
            .iter()
            .map(|email| description_update(email, product_name, description, product_url))
            .collect(),
    }
}

/// Escape text for interpolation into HTML element content and attributes
pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn page(body: &str) -> String {
    format!("<html>\n<body>\n{}\n</body>\n</html>\n", body)
}

fn verify_email(to: &str, otp: &str) -> OutboundEmail {
    let html = page(&format!(
        "<h2>Email Verification</h2>\n\
         <p>Your OTP code is: <strong>{}</strong></p>\n\
         <p>This code will expire in 10 minutes.</p>\n\
         <p>If you did not request this code, please ignore this email.</p>",
        escape_html(otp)
    ));
    OutboundEmail::new(to, "Email Verification - Your OTP Code", html)
}

fn reset_password(to: &str, otp: &str) -> OutboundEmail {
    let html = page(&format!(
        "<h2>Password Reset Request</h2>\n\
         <p>You have requested to reset your password.</p>\n\
         <p>Your OTP code is: <strong>{}</strong></p>\n\
         <p>This code will expire in 10 minutes.</p>\n\
         <p>If you did not request a password reset, please ignore this email and your password will remain unchanged.</p>",
        escape_html(otp)
    ));
    OutboundEmail::new(to, "Password Reset - Your OTP Code", html)
}

fn bid_placed(
    product_name: &str,
    new_price: &str,
    seller_email: &str,
    bidder_email: &str,
    prev_bidder_email: Option<&str>,
) -> Vec<OutboundEmail> {
    let product = escape_html(product_name);
    let price = escape_html(new_price);

    let mut emails = vec![
        OutboundEmail::new(
            seller_email,
            "New Bid Placed on Your Product",
            page(&format!(
                "<h2>New Bid Received!</h2>\n\
                 <p>Great news! A new bid has been placed on your product: <strong>{product}</strong></p>\n\
                 <p>New bid amount: <strong>${price}</strong></p>\n\
                 <p>Log in to your account to view the bidder details and manage your auction.</p>"
            )),
        ),
        OutboundEmail::new(
            bidder_email,
            format!("Bid Confirmation - {}", product_name),
            page(&format!(
                "<h2>Bid Placed Successfully!</h2>\n\
                 <p>Your bid has been successfully placed on: <strong>{product}</strong></p>\n\
                 <p>Your bid amount: <strong>${price}</strong></p>\n\
                 <p>You are currently the highest bidder. We'll notify you if someone outbids you.</p>\n\
                 <p>Good luck!</p>"
            )),
        ),
    ];

    if let Some(prev) = prev_bidder_email {
        emails.push(OutboundEmail::new(
            prev,
            format!("You've Been Outbid - {}", product_name),
            page(&format!(
                "<h2>You've Been Outbid</h2>\n\
                 <p>Someone has placed a higher bid on: <strong>{product}</strong></p>\n\
                 <p>New highest bid: <strong>${price}</strong></p>\n\
                 <p>Don't miss out! Place a higher bid to stay in the running.</p>"
            )),
        ));
    }

    emails
}

fn bid_rejected(to: &str, product_name: &str, reason: &str) -> OutboundEmail {
    let html = page(&format!(
        "<h2>Bid Rejected</h2>\n\
         <p>Unfortunately, your bid on <strong>{}</strong> has been rejected by the seller.</p>\n\
         <p>Reason: <em>{}</em></p>\n\
         <p>We apologize for any inconvenience. Please feel free to browse other auctions on TradeBidz.</p>",
        escape_html(product_name),
        escape_html(reason)
    ));
    OutboundEmail::new(to, format!("Bid Rejected - {}", product_name), html)
}

/// Contact details exchanged between seller and winner when known
struct WinnerContact<'a> {
    seller_name: Option<&'a str>,
    winner_name: Option<&'a str>,
    winner_email: &'a str,
    winner_address: Option<&'a str>,
}

impl WinnerContact<'_> {
    fn seller_section(&self) -> String {
        if self.winner_name.is_none() && self.winner_address.is_none() {
            return String::new();
        }
        let mut rows = Vec::new();
        if let Some(name) = self.winner_name {
            rows.push(format!("<li>Name: {}</li>", escape_html(name)));
        }
        rows.push(format!("<li>Email: {}</li>", escape_html(self.winner_email)));
        if let Some(address) = self.winner_address {
            rows.push(format!("<li>Shipping address: {}</li>", escape_html(address)));
        }
        format!("\n<p><strong>Winner details:</strong></p>\n<ul>{}</ul>", rows.join(""))
    }

    fn winner_section(&self) -> String {
        match self.seller_name {
            Some(name) => format!("\n<p>Seller: <strong>{}</strong></p>", escape_html(name)),
            None => String::new(),
        }
    }
}

fn auction_success(
    seller_email: &str,
    winner_email: &str,
    product_name: &str,
    price: &str,
    contact: WinnerContact<'_>,
) -> Vec<OutboundEmail> {
    let product = escape_html(product_name);
    let price = escape_html(price);

    vec![
        OutboundEmail::new(
            seller_email,
            "Congratulations! Your Auction Sold Successfully",
            page(&format!(
                "<h2>Auction Successful!</h2>\n\
                 <p>Congratulations! Your auction for <strong>{product}</strong> has ended successfully.</p>\n\
                 <p>Final sale price: <strong>${price}</strong></p>{}\n\
                 <p>The winning bidder will be contacted shortly. Please log in to your account to view the winner's details and complete the transaction.</p>",
                contact.seller_section()
            )),
        ),
        OutboundEmail::new(
            winner_email,
            "Congratulations! You Won the Auction",
            page(&format!(
                "<h2>You Won!</h2>\n\
                 <p>Congratulations! You have won the auction for <strong>{product}</strong>!</p>\n\
                 <p>Your winning bid: <strong>${price}</strong></p>{}\n\
                 <p>The seller will contact you shortly to arrange payment and delivery. Please log in to your account for more details.</p>\n\
                 <p>Thank you for using TradeBidz!</p>",
                contact.winner_section()
            )),
        ),
    ]
}

fn auction_fail(to: &str, product_name: &str) -> OutboundEmail {
    let html = page(&format!(
        "<h2>Auction Ended</h2>\n\
         <p>Your auction for <strong>{}</strong> has ended.</p>\n\
         <p>Unfortunately, no bids were received during this auction period.</p>\n\
         <p>You can consider relisting the item with adjusted pricing or improved descriptions to attract more bidders.</p>\n\
         <p>Thank you for using TradeBidz!</p>",
        escape_html(product_name)
    ));
    OutboundEmail::new(to, "Auction Ended - No Bids Received", html)
}

fn new_question(to: &str, product_name: &str, question: &str, product_url: &str) -> OutboundEmail {
    let html = page(&format!(
        "<h2>New Question Received</h2>\n\
         <p>A potential buyer has asked a question about your product: <strong>{}</strong></p>\n\
         <p><strong>Question:</strong></p>\n\
         <p style=\"padding: 10px; background-color: #f5f5f5; border-left: 3px solid #007bff;\">{}</p>\n\
         <p>Please answer this question to help increase buyer confidence and improve your chances of a successful sale.</p>\n\
         <p><a href=\"{}\" style=\"background-color: #007bff; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px; display: inline-block;\">View Product &amp; Answer Question</a></p>",
        escape_html(product_name),
        escape_html(question),
        escape_html(product_url)
    ));
    OutboundEmail::new(
        to,
        format!("New Question About Your Product - {}", product_name),
        html,
    )
}

fn new_answer(to: &str, product_name: &str, question: &str, answer: &str) -> OutboundEmail {
    let html = page(&format!(
        "<h2>New Answer Posted</h2>\n\
         <p>The seller has answered a question about <strong>{}</strong>, a product you're interested in.</p>\n\
         <p><strong>Question:</strong></p>\n\
         <p style=\"padding: 10px; background-color: #f5f5f5; border-left: 3px solid #007bff;\">{}</p>\n\
         <p><strong>Answer:</strong></p>\n\
         <p style=\"padding: 10px; background-color: #e8f4f8; border-left: 3px solid #28a745;\">{}</p>\n\
         <p>This information may help you make a more informed bidding decision.</p>",
        escape_html(product_name),
        escape_html(question),
        escape_html(answer)
    ));
    OutboundEmail::new(
        to,
        format!("Seller Answered a Question - {}", product_name),
        html,
    )
}

fn description_update(
    to: &str,
    product_name: &str,
    description: &str,
    product_url: &str,
) -> OutboundEmail {
    let html = page(&format!(
        "<h2>Product Description Updated</h2>\n\
         <p>The seller has updated the description of <strong>{}</strong>, a product you have bid on.</p>\n\
         <p><strong>New information:</strong></p>\n\
         <div style=\"padding: 10px; background-color: #f5f5f5; border-left: 3px solid #007bff;\">{}</div>\n\
         <p><a href=\"{}\" style=\"background-color: #007bff; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px; display: inline-block;\">View Product</a></p>",
        escape_html(product_name),
        escape_html(description),
        escape_html(product_url)
    ));
    OutboundEmail::new(
        to,
        format!("Product Description Updated - {}", product_name),
        html,
    )
}
