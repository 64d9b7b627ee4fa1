/// Outbound integrations
///
/// - `mailer`: transactional email, sent in the background
/// - `images`: image hosting for avatars and supply photos

pub mod images;
pub mod mailer;
