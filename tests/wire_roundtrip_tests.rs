//! Round-trip coverage for the wire formats that cross module boundaries.

use std::io::Cursor;

use shardfish_server::plasma::factory::{class_id, read_creatable, write_creatable, Creatable};
use shardfish_server::plasma::key::{Key, Location, Uoid};
use shardfish_server::plasma::messages::ki::{self, KiMessage};
use shardfish_server::plasma::messages::notify::{EventData, NotifyMsg};
use shardfish_server::plasma::messages::Message;
use shardfish_server::plasma::net_messages::game_message::NetMsgGameMessage;
use shardfish_server::plasma::net_messages::members::{ClientGuid, MemberInfo, NetMsgMembersList};
use shardfish_server::plasma::net_messages::sdl_state::NetMsgSdlState;
use shardfish_server::plasma::net_messages::{content_flags, NetMessage};
use shardfish_server::vault::{NodeType, VaultNode};

fn roundtrip(msg: &Creatable) -> Creatable {
    let mut buffer = Vec::new();
    write_creatable(&mut buffer, Some(msg)).expect("encode");
    *read_creatable(&mut Cursor::new(buffer))
        .expect("decode")
        .expect("non-null")
}

#[test]
fn chat_message_inside_game_message() {
    let chat = KiMessage {
        base: Message {
            sender: Key::from_uoid(Uoid {
                location: Location::make(100, 0, 0),
                object_type: 0x0001,
                name: "Avatar01".to_string(),
                id: 42,
                ..Default::default()
            }),
            timestamp: 1234.5,
            ..Default::default()
        },
        command: ki::command::CHAT_MESSAGE,
        user: "Esher".to_string(),
        player_id: 30101,
        string: "Find the path".to_string(),
        ..Default::default()
    };
    let outer = Creatable::NetMsgGameMessage(Box::new(NetMsgGameMessage {
        base: NetMessage::with_flags(
            content_flags::HAS_TIME_SENT | content_flags::NEEDS_RELIABLE_SEND,
        ),
        message: Some(Box::new(Creatable::KiMessage(Box::new(chat.clone())))),
        ..Default::default()
    }));

    let back = roundtrip(&outer);
    assert_eq!(back.class_id(), class_id::NET_MSG_GAME_MESSAGE);
    match back {
        Creatable::NetMsgGameMessage(msg) => match msg.message.as_deref() {
            Some(Creatable::KiMessage(inner)) => assert_eq!(**inner, chat),
            other => panic!("wrong inner message: {other:?}"),
        },
        other => panic!("wrong outer message: {other:?}"),
    }
}

#[test]
fn reserialization_is_byte_stable() {
    let msg = Creatable::NotifyMsg(Box::new(NotifyMsg {
        notify_type: 1,
        state: 1.0,
        id: -3,
        events: vec![EventData::ResponderState { state: 2 }],
        ..Default::default()
    }));

    let mut first = Vec::new();
    write_creatable(&mut first, Some(&msg)).unwrap();
    let decoded = read_creatable(&mut Cursor::new(first.clone()))
        .unwrap()
        .unwrap();
    let mut second = Vec::new();
    write_creatable(&mut second, Some(&decoded)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn members_list_roundtrip() {
    let mut guid = ClientGuid::default();
    guid.set_player_id(5100);
    guid.set_player_name("Catherine");
    guid.set_ccr_level(0);

    let list = Creatable::NetMsgMembersList(Box::new(NetMsgMembersList {
        base: NetMessage::with_flags(
            content_flags::HAS_TIME_SENT | content_flags::HAS_PLAYER_ID,
        ),
        members: vec![MemberInfo {
            flags: 0,
            client: guid,
            avatar_key: Uoid {
                name: "Avatar02".to_string(),
                object_type: 1,
                id: 9,
                ..Default::default()
            },
        }],
    }));
    let back = roundtrip(&list);
    assert_eq!(back, list);
}

#[test]
fn sdl_state_message_roundtrip_preserves_blob() {
    let blob: Vec<u8> = (0..512).map(|i| (i % 251) as u8).collect();
    let msg = Creatable::NetMsgSdlState(Box::new(NetMsgSdlState {
        object: Uoid {
            name: "AgeSDLHook".to_string(),
            object_type: 1,
            id: 1,
            ..Default::default()
        },
        sdl_blob: blob.clone(),
        is_initial: true,
        persist_on_server: true,
        ..Default::default()
    }));

    // Large blobs get zlib-compressed on the wire.
    let mut buffer = Vec::new();
    write_creatable(&mut buffer, Some(&msg)).unwrap();
    let back = read_creatable(&mut Cursor::new(buffer)).unwrap().unwrap();
    match *back {
        Creatable::NetMsgSdlState(state) => {
            assert_eq!(state.sdl_blob, blob);
            assert!(state.is_initial);
        }
        other => panic!("wrong message: {other:?}"),
    }
}

#[test]
fn vault_node_blob_is_sparse() {
    let mut node = VaultNode::default();
    node.set_node_type(NodeType::Chronicle as i32);
    node.set_istring64_1("GlobalChronicle");
    node.set_text_1("entry text");

    let blob = node.to_blob().unwrap();
    let back = VaultNode::from_blob(&blob).unwrap();
    assert_eq!(back, node);
    assert!(!back.has_uuid_1());

    // Truncated blobs must be rejected.
    assert!(VaultNode::from_blob(&blob[..blob.len() - 3]).is_err());
}

#[test]
fn unknown_creatable_fails_the_stream() {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&0x7ABCu16.to_le_bytes());
    assert!(read_creatable(&mut Cursor::new(buffer)).is_err());
}
