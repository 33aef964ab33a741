//! Member profiles in `users/{code}` and the home-screen shout-out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use nest_store::{Database, DocRef, Subscription};

use crate::auth::{Accounts, SHARED_SECRET};
use crate::couple::Member;
use crate::error::NestError;

pub const USERS: &str = "users";

/// Shout-out shown when a member has none.
pub const DEFAULT_SHOUTOUT: &str = "今天也是想你的一天...";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub birthday: String,
    #[serde(default)]
    pub shoutout: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Profile written the first time the nest is set up.
    pub fn initial(member: Member) -> Self {
        let (birthday, shoutout) = match member {
            Member::Code812 => ("1995-08-12", DEFAULT_SHOUTOUT),
            Member::Code917 => ("1995-09-17", "每天都想抱抱你~"),
        };
        Self {
            name: format!("宝宝{}", member.code()),
            birthday: birthday.to_string(),
            shoutout: shoutout.to_string(),
            created_at: Some(Utc::now()),
        }
    }
}

fn shoutout_or_default(value: Option<&Value>) -> String {
    match value.and_then(Value::as_str) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => DEFAULT_SHOUTOUT.to_string(),
    }
}

/// Access to both members' profiles.
#[derive(Clone)]
pub struct Profiles {
    db: Database,
}

impl Profiles {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn doc(&self, member: Member) -> DocRef {
        self.db.doc(USERS, member.code())
    }

    pub fn get(&self, member: Member) -> Result<Option<UserProfile>, NestError> {
        Ok(self.doc(member).get_as()?)
    }

    /// The shout-out on `member`'s home screen.
    pub fn shoutout_for(&self, member: Member) -> Result<String, NestError> {
        let doc = self.doc(member).get()?;
        Ok(shoutout_or_default(doc.as_ref().and_then(|d| d.get("shoutout"))))
    }

    /// Leave a shout-out on the partner's home screen.
    pub fn send_shoutout(&self, from: Member, text: &str) -> Result<(), NestError> {
        let partner = from.partner();
        let mut patch = serde_json::Map::new();
        patch.insert("shoutout".into(), json!(text));
        self.doc(partner).update(patch)?;
        log::info!("{from} left a shout-out for {partner}");
        Ok(())
    }

    /// Follow `member`'s shout-out; the callback gets the default text when
    /// the profile is missing or its shout-out is empty.
    pub fn watch_shoutout<F>(&self, member: Member, callback: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.doc(member).on_snapshot(move |snap| {
            callback(&shoutout_or_default(snap.get("shoutout")));
        })
    }

    /// Write the initial profile unless one exists. Returns whether it wrote.
    pub fn ensure_initial(&self, member: Member) -> Result<bool, NestError> {
        let doc = self.doc(member);
        if doc.exists()? {
            return Ok(false);
        }
        doc.set_as(&UserProfile::initial(member))?;
        Ok(true)
    }
}

/// Register both members' accounts and give each a profile.
pub fn seed_couple(accounts: &Accounts, profiles: &Profiles) -> Result<(), NestError> {
    for member in Member::ALL {
        accounts.sign_up(&member.email(), SHARED_SECRET)?;
        if profiles.ensure_initial(member)? {
            log::info!("Created profile for {member}");
        }
    }
    Ok(())
}
