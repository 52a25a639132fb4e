use std::sync::Arc;

use derive_new::new;

use crate::mail::{MailSettings, Mailer};
use crate::tracker::Tracker;
use crate::vcard::VCard;

/// Shared state handed to every request handler.
#[derive(Clone, new)]
pub struct App {
    pub tracker: Tracker,
    pub mailer: Arc<dyn Mailer>,
    pub mail: Arc<MailSettings>,
    pub card: Arc<VCard>,
}
