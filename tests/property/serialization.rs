//! Property-based tests for the shared data model and push codec.
//!
//! Uses proptest to verify:
//! 1. Pair canonicalization is order-independent for any two distinct identities.
//! 2. Body validation agrees with "trimmed body is empty" for any input.
//! 3. Random bytes and random text never cause a panic in client decoding.
//! 4. A pushed `Message` event survives both framings for any valid content.

use proptest::prelude::*;
use pairchat_proto::codec::{self, Frame, Framing};
use pairchat_proto::event::ServerEvent;
use pairchat_proto::identity::{Identity, Participants};
use pairchat_proto::message::{
    ChatId, MAX_BODY_SIZE, Message, MessageId, Timestamp, ValidationError, validate_body,
};
use uuid::Uuid;

/// Strategy for generating well-formed identities.
fn arb_identity() -> impl Strategy<Value = Identity> {
    "[A-Za-z0-9_.:@-]{1,64}".prop_map(|s| Identity::parse(s).unwrap())
}

/// Strategy for generating stored messages with arbitrary non-empty bodies.
fn arb_message() -> impl Strategy<Value = Message> {
    (
        any::<u128>(),
        any::<u128>(),
        arb_identity(),
        arb_identity(),
        "[^\x00]{1,512}",
        any::<u64>(),
    )
        .prop_map(|(id, chat, sender, receiver, body, millis)| Message {
            id: MessageId::from_uuid(Uuid::from_u128(id)),
            chat_id: ChatId::from_uuid(Uuid::from_u128(chat)),
            sender_id: sender,
            receiver_id: receiver,
            body,
            sent_at: Timestamp::from_millis(millis),
        })
}

proptest! {
    #[test]
    fn participants_order_independent(a in arb_identity(), b in arb_identity()) {
        prop_assume!(a != b);
        let ab = Participants::new(a.clone(), b.clone()).unwrap();
        let ba = Participants::new(b.clone(), a.clone()).unwrap();
        prop_assert_eq!(&ab, &ba);
        prop_assert!(ab.is_pair(&a, &b));
        prop_assert_eq!(ab.other(&a), Some(&b));
    }

    #[test]
    fn participants_reject_self(a in arb_identity()) {
        prop_assert!(Participants::new(a.clone(), a).is_err());
    }

    #[test]
    fn validation_matches_trimmed_emptiness(body in "\\PC{0,64}|[ \t\n]{0,8}") {
        let result = validate_body(&body, MAX_BODY_SIZE);
        if body.trim().is_empty() {
            prop_assert_eq!(result, Err(ValidationError::Empty));
        } else {
            prop_assert!(result.is_ok());
        }
    }

    #[test]
    fn random_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = codec::decode_client_binary(&bytes);
    }

    #[test]
    fn random_text_never_panics(text in "\\PC{0,256}") {
        let _ = codec::decode_client_text(&text);
    }

    #[test]
    fn pushed_message_survives_framing(msg in arb_message(), binary in any::<bool>()) {
        let framing = if binary { Framing::Binary } else { Framing::Text };
        let event = ServerEvent::Message(msg);
        let decoded = match codec::encode_server(&event, framing).unwrap() {
            Frame::Text(text) => codec::decode_server_text(&text).unwrap(),
            Frame::Binary(bytes) => codec::decode_server_binary(&bytes).unwrap(),
        };
        prop_assert_eq!(decoded, event);
    }
}
