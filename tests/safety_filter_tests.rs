//! The relay safety filter: no path through a client-crafted game message may
//! deliver privileged content to other clients.

use shardfish_server::plasma::factory::Creatable;
use shardfish_server::plasma::messages::avatar::{
    AvBrainGeneric, AvCoopMsg, AvSeekMsg, AvTaskMsg, CoopCoordinator,
};
use shardfish_server::plasma::messages::callbacks::MessageWithCallbacks;
use shardfish_server::plasma::messages::clone::LoadCloneMsg;
use shardfish_server::plasma::messages::ki::{self, KiMessage};
use shardfish_server::plasma::messages::{BackdoorMsg, InputEventMsg, WarpMsg};
use shardfish_server::plasma::net_messages::game_message::NetMsgGameMessage;

fn admin_chat() -> KiMessage {
    KiMessage {
        command: ki::command::CHAT_MESSAGE,
        flags: ki::flags::ADMIN_MSG | ki::flags::PRIVATE_MSG,
        string: "I am totally the server".to_string(),
        ..Default::default()
    }
}

fn wrap(inner: Creatable) -> Creatable {
    Creatable::NetMsgGameMessage(Box::new(NetMsgGameMessage {
        message: Some(Box::new(inner)),
        ..Default::default()
    }))
}

#[test]
fn admin_flag_never_survives_the_relay() {
    let mut wrapped = wrap(Creatable::KiMessage(Box::new(admin_chat())));
    assert!(wrapped.make_safe_for_net());

    // After scrubbing, the admin bit is gone from the nested message.
    match wrapped {
        Creatable::NetMsgGameMessage(msg) => match msg.message.as_deref() {
            Some(Creatable::KiMessage(inner)) => {
                assert_eq!(inner.flags & ki::flags::ADMIN_MSG, 0);
                assert_ne!(inner.flags & ki::flags::PRIVATE_MSG, 0);
            }
            other => panic!("unexpected inner: {other:?}"),
        },
        other => panic!("unexpected outer: {other:?}"),
    }
}

#[test]
fn non_chat_ki_commands_are_dropped() {
    for command in [4u8, 9, 10, 21] {
        let mut wrapped = wrap(Creatable::KiMessage(Box::new(KiMessage {
            command,
            ..Default::default()
        })));
        assert!(!wrapped.make_safe_for_net(), "command {command} passed");
    }
}

#[test]
fn privileged_types_are_never_forwardable() {
    let cases: Vec<Creatable> = vec![
        Creatable::BackdoorMsg(Box::new(BackdoorMsg::default())),
        Creatable::AvTaskMsg(Box::new(AvTaskMsg::default())),
        Creatable::AvSeekMsg(Box::new(AvSeekMsg::default())),
        Creatable::InputEventMsg(Box::new(InputEventMsg::default())),
        Creatable::WarpMsg(Box::new(WarpMsg::default())),
        Creatable::LinkToAgeMsg(Box::new(Default::default())),
        Creatable::LinkingMgrMsg(Box::new(Default::default())),
    ];
    for inner in cases {
        let label = inner.class_id();
        let mut wrapped = wrap(inner);
        assert!(
            !wrapped.make_safe_for_net(),
            "class 0x{label:04X} passed the filter"
        );
    }
}

#[test]
fn callbacks_are_checked_recursively() {
    let mut clean = wrap(Creatable::MessageWithCallbacks(Box::new(
        MessageWithCallbacks {
            callbacks: vec![Some(Box::new(Creatable::KiMessage(Box::new(admin_chat()))))],
            ..Default::default()
        },
    )));
    assert!(clean.make_safe_for_net());

    let mut dirty = wrap(Creatable::MessageWithCallbacks(Box::new(
        MessageWithCallbacks {
            callbacks: vec![Some(Box::new(Creatable::BackdoorMsg(Box::new(
                BackdoorMsg::default(),
            ))))],
            ..Default::default()
        },
    )));
    assert!(!dirty.make_safe_for_net());
}

#[test]
fn clone_trigger_messages_are_checked() {
    let mut armed = wrap(Creatable::LoadCloneMsg(Box::new(LoadCloneMsg {
        trigger_msg: Some(Box::new(Creatable::WarpMsg(Box::new(WarpMsg::default())))),
        ..Default::default()
    })));
    assert!(!armed.make_safe_for_net());

    let mut clean = wrap(Creatable::LoadCloneMsg(Box::new(LoadCloneMsg::default())));
    assert!(clean.make_safe_for_net());
}

#[test]
fn brains_with_payload_messages_are_rejected() {
    let mut armed = Creatable::AvBrainGeneric(Box::new(AvBrainGeneric {
        end_message: Some(Box::new(Creatable::KiMessage(Box::new(admin_chat())))),
        ..Default::default()
    }));
    assert!(!armed.make_safe_for_net());
}

#[test]
fn coop_defers_to_the_coordinator_accept_message() {
    let mut no_coordinator = wrap(Creatable::AvCoopMsg(Box::new(AvCoopMsg::default())));
    assert!(no_coordinator.make_safe_for_net());

    let mut bad_accept = wrap(Creatable::AvCoopMsg(Box::new(AvCoopMsg {
        coordinator: Some(Box::new(Creatable::CoopCoordinator(Box::new(
            CoopCoordinator {
                accept_msg: Some(Box::new(Creatable::BackdoorMsg(Box::new(
                    BackdoorMsg::default(),
                )))),
                ..Default::default()
            },
        )))),
        ..Default::default()
    })));
    assert!(!bad_accept.make_safe_for_net());

    let mut good_accept = wrap(Creatable::AvCoopMsg(Box::new(AvCoopMsg {
        coordinator: Some(Box::new(Creatable::CoopCoordinator(Box::new(
            CoopCoordinator {
                accept_msg: Some(Box::new(Creatable::KiMessage(Box::new(admin_chat())))),
                ..Default::default()
            },
        )))),
        ..Default::default()
    })));
    assert!(good_accept.make_safe_for_net());
}

#[test]
fn empty_game_messages_are_not_relayed() {
    let mut empty = wrap(Creatable::ServerReplyMsg(Box::new(Default::default())));
    assert!(empty.make_safe_for_net());

    let mut null_inner = Creatable::NetMsgGameMessage(Box::new(NetMsgGameMessage::default()));
    assert!(!null_inner.make_safe_for_net());
}
