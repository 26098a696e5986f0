use anyhow::Result;

use voice_meme_bot::dialogue::{validate_meme_name, MemeDialogueState};

/// Meme name validation: trimming, emptiness, length cap.
#[test]
fn test_meme_name_validation() {
    assert!(validate_meme_name("party horn").is_ok());
    assert!(validate_meme_name("  oof  ").is_ok());

    assert!(validate_meme_name("").is_err());
    assert!(validate_meme_name("   ").is_err());
    assert!(validate_meme_name(&"a".repeat(256)).is_err());
}

#[test]
fn test_meme_name_trimming() {
    let result = validate_meme_name("  party horn  ");
    assert_eq!(result.unwrap(), "party horn");
}

/// The default dialogue state is Start (no pending clip).
#[test]
fn test_default_dialogue_state() {
    let state = MemeDialogueState::default();
    assert!(matches!(state, MemeDialogueState::Start));
}

/// Awaiting-name state carries the pending voice file id and the user who
/// started the conversation.
#[test]
fn test_awaiting_name_state_holds_file_id_and_initiator() {
    let state = MemeDialogueState::AwaitingName {
        file_id: "FILE1".to_string(),
        user_id: 42,
    };

    match state {
        MemeDialogueState::AwaitingName { file_id, user_id } => {
            assert_eq!(file_id, "FILE1");
            assert_eq!(user_id, 42);
        }
        _ => panic!("Unexpected dialogue state"),
    }
}

/// Dialogue states round-trip through serde (required by dialogue storage).
#[test]
fn test_dialogue_state_serde_roundtrip() -> Result<()> {
    let state = MemeDialogueState::AwaitingName {
        file_id: "FILE1".to_string(),
        user_id: 42,
    };

    let json = serde_json::to_string(&state)?;
    let restored: MemeDialogueState = serde_json::from_str(&json)?;

    match restored {
        MemeDialogueState::AwaitingName { file_id, user_id } => {
            assert_eq!(file_id, "FILE1");
            assert_eq!(user_id, 42);
        }
        _ => panic!("Unexpected dialogue state after roundtrip"),
    }

    Ok(())
}
