//! Cursor command implementation.

use super::{parse_identity, require_credential, CommandResult};
use chrono::{DateTime, Utc};
use dfesync_protocol::Nsu;
use dfesync_store::Store;
use serde::Serialize;

/// Cooldown as shown to the operator.
#[derive(Debug, Serialize)]
pub struct CooldownView {
    /// Time of the EMPTY response.
    pub declared_at: DateTime<Utc>,
    /// Cursor the cooldown applies to.
    pub cursor: Nsu,
}

/// Cursor state of one credential.
#[derive(Debug, Serialize)]
pub struct CursorView {
    /// CNPJ or CPF.
    pub identity: String,
    /// Last fully consumed sequence number.
    pub cursor: Nsu,
    /// Recorded cooldown, if any.
    pub cooldown: Option<CooldownView>,
}

/// Shows the cursor and cooldown of `identity`.
pub fn show(store: &Store, identity: &str) -> CommandResult<CursorView> {
    let identity = parse_identity(identity)?;
    require_credential(store, &identity)?;
    Ok(CursorView {
        cursor: store.cursors().current(&identity),
        cooldown: store.cooldowns().get(&identity).map(|state| CooldownView {
            declared_at: state.declared_at,
            cursor: state.cursor,
        }),
        identity: identity.to_string(),
    })
}

/// Sets the cursor of `identity` and clears its cooldown.
pub fn reset(store: &Store, identity: &str, to: Option<&str>) -> CommandResult<CursorView> {
    let parsed = parse_identity(identity)?;
    require_credential(store, &parsed)?;
    let to = to.map(Nsu::parse).transpose()?.unwrap_or(Nsu::ZERO);
    store.reset_cursor(&parsed, to)?;
    show(store, identity)
}

/// Text rendering of a [`CursorView`].
pub fn print(view: &CursorView) {
    println!("{}  cursor {}", view.identity, view.cursor);
    match &view.cooldown {
        Some(cooldown) => println!(
            "  cooldown declared at {} for cursor {}",
            cooldown.declared_at.to_rfc3339(),
            cooldown.cursor
        ),
        None => println!("  no cooldown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfesync_testkit::{nsu, register, RECIPIENT_CNPJ};

    #[test]
    fn reset_moves_cursor_backwards_and_clears_cooldown() {
        let store = Store::in_memory().unwrap();
        let credential = register(&store, RECIPIENT_CNPJ);
        store.cursors().advance(&credential.identity, nsu(500)).unwrap();
        store
            .cooldowns()
            .declare(&credential.identity, Utc::now(), nsu(500))
            .unwrap();

        let before = show(&store, RECIPIENT_CNPJ).unwrap();
        assert_eq!(before.cursor, nsu(500));
        assert!(before.cooldown.is_some());

        let after = reset(&store, RECIPIENT_CNPJ, Some("120")).unwrap();
        assert_eq!(after.cursor, nsu(120));
        assert!(after.cooldown.is_none());

        let full = reset(&store, RECIPIENT_CNPJ, None).unwrap();
        assert_eq!(full.cursor, Nsu::ZERO);
    }

    #[test]
    fn unknown_identity_fails() {
        let store = Store::in_memory().unwrap();
        assert!(show(&store, RECIPIENT_CNPJ).is_err());
        assert!(reset(&store, RECIPIENT_CNPJ, Some("1")).is_err());
    }

    #[test]
    fn invalid_target_fails() {
        let store = Store::in_memory().unwrap();
        register(&store, RECIPIENT_CNPJ);
        assert!(reset(&store, RECIPIENT_CNPJ, Some("12a")).is_err());
        assert!(reset(&store, RECIPIENT_CNPJ, Some("1234567890123456")).is_err());
    }
}
