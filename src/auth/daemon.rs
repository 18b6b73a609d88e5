//! The auth daemon: one task owning the database connection, servicing
//! login, player, and vault requests serially. Workers never touch the
//! database directly; every request is answered exactly once.

use std::sync::Arc;

use sqlx::{Connection, PgConnection};
use uuid::Uuid;

use super::vault_db;
use super::{AgeInitRequest, AuthMessage, DaemonReply};
use crate::config::Config;
use crate::errors::NetResultCode;
use crate::net::channel::{MsgPump, ReplyGuard};
use crate::sdl::DescriptorDb;
use crate::types::sha::{challenge_hash, ShaDigest};

/// Account flag granting admin privileges (and login during restricted mode).
pub const ACCT_ADMIN: u32 = 1 << 0;

/// Compare a submitted login hash against the stored one. Email-style
/// accounts (an `@` that is not `@gametap`) use the SHA-0 challenge scheme;
/// everything else submits the stored hash with its words byte-swapped.
pub fn verify_password(
    acct_name: &str,
    stored: &ShaDigest,
    submitted: &ShaDigest,
    server_challenge: u32,
    client_challenge: u32,
) -> bool {
    if acct_name.contains('@') && !acct_name.contains("@gametap") {
        challenge_hash(stored, server_challenge, client_challenge) == *submitted
    } else {
        submitted.swap_words() == *stored
    }
}

pub struct AuthDaemon {
    conn: PgConnection,
    config: Arc<Config>,
    sdl_db: Arc<DescriptorDb>,
}

impl AuthDaemon {
    /// Connect and enforce the vault initialization invariant.
    pub async fn connect(config: Arc<Config>, sdl_db: Arc<DescriptorDb>) -> anyhow::Result<Self> {
        let mut conn = PgConnection::connect(&config.db.url()).await?;
        vault_db::init_vault(&mut conn).await?;
        Ok(Self {
            conn,
            config,
            sdl_db,
        })
    }

    /// Service requests until shutdown. Internal failures log, answer the
    /// requester, and keep the daemon alive.
    pub async fn run(mut self, mut pump: MsgPump<AuthMessage>) {
        tracing::info!("Auth daemon running");
        while let Some(message) = pump.next().await {
            match message {
                AuthMessage::Shutdown => break,
                AuthMessage::ClientLogin {
                    acct_name,
                    pass_hash,
                    server_challenge,
                    client_challenge,
                    reply,
                } => {
                    self.login(&acct_name, &pass_hash, server_challenge, client_challenge, reply)
                        .await;
                }
                AuthMessage::SetPlayer {
                    acct_uuid,
                    player_id,
                    reply,
                } => self.set_player(&acct_uuid, player_id, reply).await,
                AuthMessage::CreatePlayer {
                    acct_uuid,
                    player_name,
                    avatar_shape,
                    reply,
                } => {
                    self.create_player(&acct_uuid, &player_name, &avatar_shape, reply)
                        .await;
                }
                AuthMessage::DeletePlayer {
                    acct_uuid,
                    player_id,
                    reply,
                } => self.delete_player(&acct_uuid, player_id, reply).await,
                AuthMessage::AddAccount {
                    login,
                    pass_hash,
                    reply,
                } => self.add_account(&login, &pass_hash, reply).await,
                AuthMessage::VaultCreateNode { node, reply } => {
                    match vault_db::create_node(&mut self.conn, *node).await {
                        Ok(node_id) => reply.send(DaemonReply::NodeCreated {
                            code: NetResultCode::NetSuccess,
                            node_id,
                        }),
                        Err(err) => {
                            tracing::error!(error = %err, "Vault node create failed");
                            reply.send(DaemonReply::internal_error());
                        }
                    }
                }
                AuthMessage::VaultFetchNode { node_id, reply } => {
                    match vault_db::fetch_node(&mut self.conn, node_id).await {
                        Ok(Some(node)) => reply.send(DaemonReply::NodeFetched {
                            code: NetResultCode::NetSuccess,
                            node: Box::new(node),
                        }),
                        Ok(None) => {
                            reply.send(DaemonReply::Result(NetResultCode::NetVaultNodeNotFound));
                        }
                        Err(err) => {
                            tracing::error!(node_id, error = %err, "Vault node fetch failed");
                            reply.send(DaemonReply::internal_error());
                        }
                    }
                }
                AuthMessage::VaultUpdateNode {
                    node,
                    revision: _revision,
                    reply,
                } => match vault_db::update_node(&mut self.conn, &node).await {
                    Ok(true) => reply.send(DaemonReply::Result(NetResultCode::NetSuccess)),
                    Ok(false) => {
                        reply.send(DaemonReply::Result(NetResultCode::NetVaultNodeNotFound));
                    }
                    Err(err) => {
                        tracing::error!(node_id = node.node_id(), error = %err,
                                        "Vault node update failed");
                        reply.send(DaemonReply::internal_error());
                    }
                },
                AuthMessage::VaultRefNode {
                    parent,
                    child,
                    owner,
                    reply,
                } => match vault_db::ref_node(&mut self.conn, parent, child, owner).await {
                    Ok(()) => reply.send(DaemonReply::Result(NetResultCode::NetSuccess)),
                    Err(err) => {
                        tracing::error!(parent, child, error = %err, "Vault ref failed");
                        reply.send(DaemonReply::internal_error());
                    }
                },
                AuthMessage::VaultUnrefNode {
                    parent,
                    child,
                    reply,
                } => match vault_db::unref_node(&mut self.conn, parent, child).await {
                    Ok(true) => reply.send(DaemonReply::Result(NetResultCode::NetSuccess)),
                    Ok(false) => {
                        reply.send(DaemonReply::Result(NetResultCode::NetVaultNodeNotFound));
                    }
                    Err(err) => {
                        tracing::error!(parent, child, error = %err, "Vault unref failed");
                        reply.send(DaemonReply::internal_error());
                    }
                },
                AuthMessage::VaultFetchNodeTree { root, reply } => {
                    match vault_db::fetch_node_tree(&mut self.conn, root).await {
                        Ok(refs) => reply.send(DaemonReply::NodeTree {
                            code: NetResultCode::NetSuccess,
                            refs,
                        }),
                        Err(err) => {
                            tracing::error!(root, error = %err, "Vault tree fetch failed");
                            reply.send(DaemonReply::internal_error());
                        }
                    }
                }
                AuthMessage::VaultFindNode { template, reply } => {
                    match vault_db::find_nodes(&mut self.conn, &template).await {
                        Ok(ids) if ids.is_empty() => {
                            reply.send(DaemonReply::Result(NetResultCode::NetVaultNodeNotFound));
                        }
                        Ok(ids) => reply.send(DaemonReply::NodesFound {
                            code: NetResultCode::NetSuccess,
                            ids,
                        }),
                        Err(err) => {
                            tracing::error!(error = %err, "Vault find failed");
                            reply.send(DaemonReply::internal_error());
                        }
                    }
                }
                AuthMessage::VaultInitAge { request, reply } => {
                    self.init_age(&request, reply).await;
                }
                AuthMessage::VaultSetSeen {
                    parent,
                    child,
                    seen,
                } => {
                    if let Err(err) =
                        vault_db::set_seen(&mut self.conn, parent, child, seen).await
                    {
                        tracing::error!(parent, child, error = %err, "Vault set-seen failed");
                    }
                }
                AuthMessage::Disconnect { player_id, reply } => {
                    if player_id != 0 {
                        if let Err(err) =
                            vault_db::set_player_online(&mut self.conn, player_id, false).await
                        {
                            tracing::error!(player_id, error = %err,
                                            "Marking player offline failed");
                        }
                    }
                    reply.send(DaemonReply::Result(NetResultCode::NetSuccess));
                }
                AuthMessage::FindGameServer {
                    instance_uuid,
                    filename,
                    reply,
                } => self.find_game_server(&instance_uuid, &filename, reply).await,
                AuthMessage::GetPublicAges { filename, reply } => {
                    match vault_db::fetch_public_ages(&mut self.conn, &filename).await {
                        Ok(ages) => reply.send(DaemonReply::PublicAges {
                            code: NetResultCode::NetSuccess,
                            ages,
                        }),
                        Err(err) => {
                            tracing::error!(error = %err, "Public age list failed");
                            reply.send(DaemonReply::internal_error());
                        }
                    }
                }
                AuthMessage::SetAgePublic {
                    age_info_node,
                    public,
                } => {
                    if let Err(err) =
                        vault_db::set_age_public(&mut self.conn, age_info_node, public).await
                    {
                        tracing::error!(age_info_node, error = %err, "Set age public failed");
                    }
                }
            }
        }
        tracing::info!("Auth daemon stopped");
    }

    async fn login(
        &mut self,
        acct_name: &str,
        pass_hash: &ShaDigest,
        server_challenge: u32,
        client_challenge: u32,
        reply: ReplyGuard<DaemonReply>,
    ) {
        let account = match vault_db::fetch_account(&mut self.conn, acct_name).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                tracing::info!(account = acct_name, "Login to unknown account");
                // Deliberately indistinguishable from a wrong password.
                reply.send(DaemonReply::Result(NetResultCode::NetAuthenticationFailed));
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Account lookup failed");
                reply.send(DaemonReply::internal_error());
                return;
            }
        };

        let Some(stored) = ShaDigest::from_hex(&account.pass_hash) else {
            tracing::error!(account = acct_name, "Stored password hash is corrupt");
            reply.send(DaemonReply::internal_error());
            return;
        };

        if !verify_password(acct_name, &stored, pass_hash, server_challenge, client_challenge) {
            tracing::info!(account = acct_name, "Failed login");
            reply.send(DaemonReply::Result(NetResultCode::NetAuthenticationFailed));
            return;
        }

        if self.config.restrict_logins && account.acct_flags & ACCT_ADMIN == 0 {
            tracing::info!(account = acct_name, "Login denied while restricted");
            reply.send(DaemonReply::Result(NetResultCode::NetAccountLoginDenied));
            return;
        }

        let players = match vault_db::fetch_players(&mut self.conn, &account.acct_uuid).await {
            Ok(players) => players,
            Err(err) => {
                tracing::error!(error = %err, "Player list fetch failed");
                reply.send(DaemonReply::internal_error());
                return;
            }
        };

        tracing::info!(account = acct_name, uuid = %account.acct_uuid, "Logged in");
        reply.send(DaemonReply::Login {
            code: NetResultCode::NetSuccess,
            acct_uuid: account.acct_uuid,
            acct_flags: account.acct_flags,
            billing_type: account.billing_type,
            players,
        });
    }

    async fn set_player(
        &mut self,
        acct_uuid: &Uuid,
        player_id: u32,
        reply: ReplyGuard<DaemonReply>,
    ) {
        match vault_db::fetch_player(&mut self.conn, acct_uuid, player_id).await {
            Ok(Some(player)) => {
                if let Err(err) =
                    vault_db::set_player_online(&mut self.conn, player_id, true).await
                {
                    tracing::error!(player_id, error = %err, "Marking player online failed");
                }
                tracing::info!(acct = %acct_uuid, player = %player.player_name, player_id,
                               "Active player selected");
                reply.send(DaemonReply::Player {
                    code: NetResultCode::NetSuccess,
                    player,
                });
            }
            Ok(None) => {
                tracing::warn!(acct = %acct_uuid, player_id, "Requested invalid player id");
                reply.send(DaemonReply::Result(NetResultCode::NetPlayerNotFound));
            }
            Err(err) => {
                tracing::error!(error = %err, "Player lookup failed");
                reply.send(DaemonReply::internal_error());
            }
        }
    }

    async fn create_player(
        &mut self,
        acct_uuid: &Uuid,
        player_name: &str,
        avatar_shape: &str,
        reply: ReplyGuard<DaemonReply>,
    ) {
        // Only the two shipped avatars are valid; anything else is a client
        // poking at the protocol.
        let avatar_shape = match avatar_shape {
            "male" | "female" => avatar_shape,
            _ => "male",
        };

        match vault_db::player_name_taken(&mut self.conn, player_name).await {
            Ok(true) => {
                tracing::warn!(player = player_name, "Player already exists");
                reply.send(DaemonReply::Result(NetResultCode::NetPlayerAlreadyExists));
                return;
            }
            Ok(false) => {}
            Err(err) => {
                tracing::error!(error = %err, "Player name lookup failed");
                reply.send(DaemonReply::internal_error());
                return;
            }
        }

        let player_id = match vault_db::create_player(
            &mut self.conn,
            acct_uuid,
            player_name,
            avatar_shape,
            true,
        )
        .await
        {
            Ok(player_id) => player_id,
            Err(err) => {
                // The original kept going after replying here; keep the
                // single reply and bail out instead.
                tracing::error!(error = %err, "Player vault creation failed");
                reply.send(DaemonReply::internal_error());
                return;
            }
        };

        if let Err(err) = vault_db::insert_player(
            &mut self.conn,
            acct_uuid,
            player_id,
            player_name,
            avatar_shape,
            true,
        )
        .await
        {
            tracing::error!(error = %err, "Player row insert failed");
            reply.send(DaemonReply::internal_error());
            return;
        }

        tracing::info!(player = player_name, player_id, "Created player");
        reply.send(DaemonReply::Player {
            code: NetResultCode::NetSuccess,
            player: super::PlayerInfo {
                player_id,
                player_name: player_name.to_string(),
                avatar_shape: avatar_shape.to_string(),
                explorer: 1,
            },
        });
    }

    async fn delete_player(
        &mut self,
        acct_uuid: &Uuid,
        player_id: u32,
        reply: ReplyGuard<DaemonReply>,
    ) {
        match vault_db::delete_player(&mut self.conn, acct_uuid, player_id).await {
            Ok(true) => {
                tracing::info!(acct = %acct_uuid, player_id, "Deleted player");
                reply.send(DaemonReply::Result(NetResultCode::NetSuccess));
            }
            Ok(false) => reply.send(DaemonReply::Result(NetResultCode::NetPlayerNotFound)),
            Err(err) => {
                tracing::error!(error = %err, "Player delete failed");
                reply.send(DaemonReply::internal_error());
            }
        }
    }

    async fn add_account(
        &mut self,
        login: &str,
        pass_hash: &ShaDigest,
        reply: ReplyGuard<DaemonReply>,
    ) {
        match vault_db::fetch_account(&mut self.conn, login).await {
            Ok(Some(_)) => {
                reply.send(DaemonReply::Result(NetResultCode::NetAccountAlreadyExists));
                return;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(error = %err, "Account lookup failed");
                reply.send(DaemonReply::internal_error());
                return;
            }
        }
        let acct_uuid = Uuid::new_v4();
        match vault_db::insert_account(&mut self.conn, login, &pass_hash.to_hex(), &acct_uuid)
            .await
        {
            Ok(()) => {
                tracing::info!(account = login, uuid = %acct_uuid, "Created account");
                reply.send(DaemonReply::Result(NetResultCode::NetSuccess));
            }
            Err(err) => {
                tracing::error!(error = %err, "Account insert failed");
                reply.send(DaemonReply::internal_error());
            }
        }
    }

    async fn init_age(&mut self, request: &AgeInitRequest, reply: ReplyGuard<DaemonReply>) {
        match vault_db::init_age(&mut self.conn, &self.sdl_db, request).await {
            Ok(nodes) => reply.send(DaemonReply::AgeInit {
                code: NetResultCode::NetSuccess,
                age_node: nodes.age_node,
                age_info_node: nodes.age_info_node,
            }),
            Err(err) => {
                tracing::error!(filename = %request.filename, error = %err, "Age init failed");
                reply.send(DaemonReply::internal_error());
            }
        }
    }

    async fn find_game_server(
        &mut self,
        instance_uuid: &Uuid,
        filename: &str,
        reply: ReplyGuard<DaemonReply>,
    ) {
        // Make sure the vault side of the instance exists, then find or
        // register the server row.
        let request = AgeInitRequest {
            instance_uuid: *instance_uuid,
            filename: filename.to_string(),
            ..Default::default()
        };
        let nodes = match vault_db::init_age(&mut self.conn, &self.sdl_db, &request).await {
            Ok(nodes) => nodes,
            Err(err) => {
                tracing::error!(filename, error = %err, "Age lookup failed");
                reply.send(DaemonReply::internal_error());
                return;
            }
        };

        match vault_db::find_game_server(
            &mut self.conn,
            instance_uuid,
            filename,
            nodes.age_node,
            nodes.sdl_node,
        )
        .await
        {
            Ok(mcp_id) => reply.send(DaemonReply::GameServer {
                code: NetResultCode::NetSuccess,
                mcp_id,
                instance_uuid: *instance_uuid,
                age_node: nodes.age_node,
            }),
            Err(err) => {
                tracing::error!(filename, error = %err, "Game server lookup failed");
                reply.send(DaemonReply::internal_error());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_accounts_use_the_challenge_scheme() {
        // alice@example.com stores a SHA-0 password hash; the client answers
        // with SHA-0(server || client || stored).
        let stored = ShaDigest::sha0(b"beneath the surface");
        let submitted = challenge_hash(&stored, 0xCAFE_BABE, 0x1111_1111);
        assert!(verify_password(
            "alice@example.com",
            &stored,
            &submitted,
            0xCAFE_BABE,
            0x1111_1111
        ));
        // A different server challenge invalidates the answer.
        assert!(!verify_password(
            "alice@example.com",
            &stored,
            &submitted,
            0xDEAD_BEEF,
            0x1111_1111
        ));
        // Submitting the stored hash directly is not accepted either.
        assert!(!verify_password(
            "alice@example.com",
            &stored,
            &stored,
            0xCAFE_BABE,
            0x1111_1111
        ));
    }

    #[test]
    fn gametap_accounts_submit_swapped_words() {
        let stored = ShaDigest::sha1(b"relto");
        let submitted = stored.swap_words();
        assert!(verify_password("bob@gametap", &stored, &submitted, 0, 0));
        assert!(verify_password("plainname", &stored, &submitted, 0, 0));
        // The un-swapped form must not pass.
        assert!(!verify_password("bob@gametap", &stored, &stored, 0, 0));
    }
}
