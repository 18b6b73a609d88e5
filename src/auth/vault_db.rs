//! Database access for the vault graph and account tables. Only the auth
//! daemon (and each game host, for its own tables) ever holds a connection.

use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::{Connection, PgConnection, Row};
use uuid::Uuid;

use crate::sdl::{DescriptorDb, State};
use crate::vault::node::{
    VaultNode, FIELD_BLOB_1, FIELD_BLOB_2, FIELD_CREATE_AGE_NAME, FIELD_CREATE_AGE_UUID,
    FIELD_CREATE_TIME, FIELD_CREATOR_ID, FIELD_CREATOR_UUID, FIELD_INT32_1, FIELD_INT32_2,
    FIELD_INT32_3, FIELD_INT32_4, FIELD_ISTRING64_1, FIELD_ISTRING64_2, FIELD_MODIFY_TIME,
    FIELD_NODE_TYPE, FIELD_STRING64_1, FIELD_STRING64_2, FIELD_STRING64_3, FIELD_STRING64_4,
    FIELD_STRING64_5, FIELD_STRING64_6, FIELD_TEXT_1, FIELD_TEXT_2, FIELD_UINT32_1,
    FIELD_UINT32_2, FIELD_UINT32_3, FIELD_UINT32_4, FIELD_UUID_1, FIELD_UUID_2, FIELD_UUID_3,
    FIELD_UUID_4,
};
use crate::vault::{NodeRef, NodeType, StandardNode};

pub type DbResult<T> = Result<T, sqlx::Error>;

fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(0)
}

/// Stamp create/modify times and collect the SQL column/value pairs for the
/// present fields of a node.
struct InsertBuilder {
    columns: Vec<&'static str>,
    node: VaultNode,
}

impl InsertBuilder {
    fn new(mut node: VaultNode) -> Self {
        let now = now_secs();
        if !node.has_create_time() {
            node.set_create_time(now);
        }
        node.set_modify_time(now);
        Self {
            columns: present_columns(&node, false),
            node,
        }
    }
}

/// Column names for every present field, optionally including the node id.
fn present_columns(node: &VaultNode, with_id: bool) -> Vec<&'static str> {
    let mut columns = Vec::new();
    if with_id && node.has_node_id() {
        columns.push("idx");
    }
    for (mask, column) in FIELD_COLUMNS {
        if node.field_mask() & mask != 0 {
            columns.push(*column);
        }
    }
    columns
}

const FIELD_COLUMNS: &[(u64, &str)] = &[
    (FIELD_CREATE_TIME, "\"CreateTime\""),
    (FIELD_MODIFY_TIME, "\"ModifyTime\""),
    (FIELD_CREATE_AGE_NAME, "\"CreateAgeName\""),
    (FIELD_CREATE_AGE_UUID, "\"CreateAgeUuid\""),
    (FIELD_CREATOR_UUID, "\"CreatorUuid\""),
    (FIELD_CREATOR_ID, "\"CreatorIdx\""),
    (FIELD_NODE_TYPE, "\"NodeType\""),
    (FIELD_INT32_1, "\"Int32_1\""),
    (FIELD_INT32_2, "\"Int32_2\""),
    (FIELD_INT32_3, "\"Int32_3\""),
    (FIELD_INT32_4, "\"Int32_4\""),
    (FIELD_UINT32_1, "\"Uint32_1\""),
    (FIELD_UINT32_2, "\"Uint32_2\""),
    (FIELD_UINT32_3, "\"Uint32_3\""),
    (FIELD_UINT32_4, "\"Uint32_4\""),
    (FIELD_UUID_1, "\"Uuid_1\""),
    (FIELD_UUID_2, "\"Uuid_2\""),
    (FIELD_UUID_3, "\"Uuid_3\""),
    (FIELD_UUID_4, "\"Uuid_4\""),
    (FIELD_STRING64_1, "\"String64_1\""),
    (FIELD_STRING64_2, "\"String64_2\""),
    (FIELD_STRING64_3, "\"String64_3\""),
    (FIELD_STRING64_4, "\"String64_4\""),
    (FIELD_STRING64_5, "\"String64_5\""),
    (FIELD_STRING64_6, "\"String64_6\""),
    (FIELD_ISTRING64_1, "\"IString64_1\""),
    (FIELD_ISTRING64_2, "\"IString64_2\""),
    (FIELD_TEXT_1, "\"Text_1\""),
    (FIELD_TEXT_2, "\"Text_2\""),
    (FIELD_BLOB_1, "\"Blob_1\""),
    (FIELD_BLOB_2, "\"Blob_2\""),
];

/// Bind one present field onto a query, in `FIELD_COLUMNS` order.
macro_rules! bind_fields {
    ($query:ident, $node:expr) => {{
        let node = $node;
        if node.has_create_time() {
            $query = $query.bind(node.create_time() as i64);
        }
        if node.has_modify_time() {
            $query = $query.bind(node.modify_time() as i64);
        }
        if node.has_create_age_name() {
            $query = $query.bind(node.create_age_name().to_string());
        }
        if node.has_create_age_uuid() {
            $query = $query.bind(node.create_age_uuid());
        }
        if node.has_creator_uuid() {
            $query = $query.bind(node.creator_uuid());
        }
        if node.has_creator_id() {
            $query = $query.bind(node.creator_id() as i64);
        }
        if node.has_node_type() {
            $query = $query.bind(node.node_type());
        }
        if node.has_int32_1() {
            $query = $query.bind(node.int32_1());
        }
        if node.has_int32_2() {
            $query = $query.bind(node.int32_2());
        }
        if node.has_int32_3() {
            $query = $query.bind(node.int32_3());
        }
        if node.has_int32_4() {
            $query = $query.bind(node.int32_4());
        }
        if node.has_uint32_1() {
            $query = $query.bind(node.uint32_1() as i64);
        }
        if node.has_uint32_2() {
            $query = $query.bind(node.uint32_2() as i64);
        }
        if node.has_uint32_3() {
            $query = $query.bind(node.uint32_3() as i64);
        }
        if node.has_uint32_4() {
            $query = $query.bind(node.uint32_4() as i64);
        }
        if node.has_uuid_1() {
            $query = $query.bind(node.uuid_1());
        }
        if node.has_uuid_2() {
            $query = $query.bind(node.uuid_2());
        }
        if node.has_uuid_3() {
            $query = $query.bind(node.uuid_3());
        }
        if node.has_uuid_4() {
            $query = $query.bind(node.uuid_4());
        }
        if node.has_string64_1() {
            $query = $query.bind(node.string64_1().to_string());
        }
        if node.has_string64_2() {
            $query = $query.bind(node.string64_2().to_string());
        }
        if node.has_string64_3() {
            $query = $query.bind(node.string64_3().to_string());
        }
        if node.has_string64_4() {
            $query = $query.bind(node.string64_4().to_string());
        }
        if node.has_string64_5() {
            $query = $query.bind(node.string64_5().to_string());
        }
        if node.has_string64_6() {
            $query = $query.bind(node.string64_6().to_string());
        }
        if node.has_istring64_1() {
            $query = $query.bind(node.istring64_1().to_string());
        }
        if node.has_istring64_2() {
            $query = $query.bind(node.istring64_2().to_string());
        }
        if node.has_text_1() {
            $query = $query.bind(node.text_1().to_string());
        }
        if node.has_text_2() {
            $query = $query.bind(node.text_2().to_string());
        }
        if node.has_blob_1() {
            $query = $query.bind(node.blob_1().to_vec());
        }
        if node.has_blob_2() {
            $query = $query.bind(node.blob_2().to_vec());
        }
    }};
}

/// Persist a new node and return its id.
pub async fn create_node(conn: &mut PgConnection, node: VaultNode) -> DbResult<u32> {
    let builder = InsertBuilder::new(node);
    let placeholders: Vec<String> = (1..=builder.columns.len())
        .map(|i| format!("${i}"))
        .collect();
    let sql = format!(
        "INSERT INTO vault.\"Nodes\" ({}) VALUES ({}) RETURNING idx",
        builder.columns.join(", "),
        placeholders.join(", ")
    );

    let mut query = sqlx::query(&sql);
    bind_fields!(query, &builder.node);
    let row = query.fetch_one(&mut *conn).await?;
    Ok(row.get::<i32, _>(0) as u32)
}

fn row_to_node(row: &sqlx::postgres::PgRow) -> VaultNode {
    let mut node = VaultNode::default();
    node.set_node_id(row.get::<i32, _>("idx") as u32);
    if let Ok(value) = row.try_get::<i64, _>("CreateTime") {
        node.set_create_time(value as u32);
    }
    if let Ok(value) = row.try_get::<i64, _>("ModifyTime") {
        node.set_modify_time(value as u32);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>, _>("CreateAgeName") {
        node.set_create_age_name(&value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<Uuid>, _>("CreateAgeUuid") {
        node.set_create_age_uuid(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<Uuid>, _>("CreatorUuid") {
        node.set_creator_uuid(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<i64>, _>("CreatorIdx") {
        node.set_creator_id(value as u32);
    }
    if let Ok(Some(value)) = row.try_get::<Option<i32>, _>("NodeType") {
        node.set_node_type(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<i32>, _>("Int32_1") {
        node.set_int32_1(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<i32>, _>("Int32_2") {
        node.set_int32_2(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<i32>, _>("Int32_3") {
        node.set_int32_3(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<i32>, _>("Int32_4") {
        node.set_int32_4(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<i64>, _>("Uint32_1") {
        node.set_uint32_1(value as u32);
    }
    if let Ok(Some(value)) = row.try_get::<Option<i64>, _>("Uint32_2") {
        node.set_uint32_2(value as u32);
    }
    if let Ok(Some(value)) = row.try_get::<Option<i64>, _>("Uint32_3") {
        node.set_uint32_3(value as u32);
    }
    if let Ok(Some(value)) = row.try_get::<Option<i64>, _>("Uint32_4") {
        node.set_uint32_4(value as u32);
    }
    if let Ok(Some(value)) = row.try_get::<Option<Uuid>, _>("Uuid_1") {
        node.set_uuid_1(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<Uuid>, _>("Uuid_2") {
        node.set_uuid_2(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<Uuid>, _>("Uuid_3") {
        node.set_uuid_3(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<Uuid>, _>("Uuid_4") {
        node.set_uuid_4(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>, _>("String64_1") {
        node.set_string64_1(&value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>, _>("String64_2") {
        node.set_string64_2(&value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>, _>("String64_3") {
        node.set_string64_3(&value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>, _>("String64_4") {
        node.set_string64_4(&value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>, _>("String64_5") {
        node.set_string64_5(&value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>, _>("String64_6") {
        node.set_string64_6(&value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>, _>("IString64_1") {
        node.set_istring64_1(&value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>, _>("IString64_2") {
        node.set_istring64_2(&value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>, _>("Text_1") {
        node.set_text_1(&value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>, _>("Text_2") {
        node.set_text_2(&value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<Vec<u8>>, _>("Blob_1") {
        node.set_blob_1(&value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<Vec<u8>>, _>("Blob_2") {
        node.set_blob_2(&value);
    }
    node
}

/// Fetch a node's full field set.
pub async fn fetch_node(conn: &mut PgConnection, node_id: u32) -> DbResult<Option<VaultNode>> {
    let row = sqlx::query("SELECT * FROM vault.\"Nodes\" WHERE idx = $1")
        .bind(node_id as i32)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(row_to_node))
}

/// Apply the present fields of a partial node onto an existing row.
pub async fn update_node(conn: &mut PgConnection, node: &VaultNode) -> DbResult<bool> {
    let mut partial = node.clone();
    partial.set_modify_time(now_secs());

    let columns = present_columns(&partial, false);
    if columns.is_empty() {
        return Ok(true);
    }
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = ${}", i + 2))
        .collect();
    let sql = format!(
        "UPDATE vault.\"Nodes\" SET {} WHERE idx = $1",
        assignments.join(", ")
    );

    let mut query = sqlx::query(&sql).bind(node.node_id() as i32);
    bind_fields!(query, &partial);
    let result = query.execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Idempotent directed edge insert.
pub async fn ref_node(
    conn: &mut PgConnection,
    parent: u32,
    child: u32,
    owner: u32,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO vault.\"NodeRefs\" (\"ParentIdx\", \"ChildIdx\", \"OwnerIdx\") \
         VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
    )
    .bind(parent as i32)
    .bind(child as i32)
    .bind(owner as i32)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Remove an edge. The child node stays even when this was its last parent.
pub async fn unref_node(conn: &mut PgConnection, parent: u32, child: u32) -> DbResult<bool> {
    let result = sqlx::query(
        "DELETE FROM vault.\"NodeRefs\" WHERE \"ParentIdx\" = $1 AND \"ChildIdx\" = $2",
    )
    .bind(parent as i32)
    .bind(child as i32)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_seen(
    conn: &mut PgConnection,
    parent: u32,
    child: u32,
    seen: bool,
) -> DbResult<()> {
    sqlx::query(
        "UPDATE vault.\"NodeRefs\" SET \"Seen\" = $3 \
         WHERE \"ParentIdx\" = $1 AND \"ChildIdx\" = $2",
    )
    .bind(parent as i32)
    .bind(child as i32)
    .bind(seen)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn child_refs(conn: &mut PgConnection, parent: u32) -> DbResult<Vec<NodeRef>> {
    let rows = sqlx::query(
        "SELECT \"ParentIdx\", \"ChildIdx\", \"OwnerIdx\", \"Seen\" \
         FROM vault.\"NodeRefs\" WHERE \"ParentIdx\" = $1",
    )
    .bind(parent as i32)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows
        .iter()
        .map(|row| NodeRef {
            parent: row.get::<i32, _>(0) as u32,
            child: row.get::<i32, _>(1) as u32,
            owner: row.get::<i32, _>(2) as u32,
            seen: row.get::<bool, _>(3),
        })
        .collect())
}

/// Collect every edge reachable from `root`. The graph may contain cycles;
/// a visited set bounds the walk.
pub async fn fetch_node_tree(conn: &mut PgConnection, root: u32) -> DbResult<Vec<NodeRef>> {
    let mut visited = std::collections::HashSet::new();
    let mut pending = vec![root];
    let mut refs = Vec::new();

    while let Some(parent) = pending.pop() {
        if !visited.insert(parent) {
            continue;
        }
        for node_ref in child_refs(conn, parent).await? {
            pending.push(node_ref.child);
            refs.push(node_ref);
        }
    }
    Ok(refs)
}

/// Find node ids matching the template's present fields by equality.
pub async fn find_nodes(conn: &mut PgConnection, template: &VaultNode) -> DbResult<Vec<u32>> {
    let columns = present_columns(template, false);
    if columns.is_empty() {
        return Ok(Vec::new());
    }
    let conditions: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = ${}", i + 1))
        .collect();
    let sql = format!(
        "SELECT idx FROM vault.\"Nodes\" WHERE {}",
        conditions.join(" AND ")
    );

    let mut query = sqlx::query(&sql);
    bind_fields!(query, template);
    let rows = query.fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(|row| row.get::<i32, _>(0) as u32).collect())
}

/// Ensure the global invariant: exactly one System node with a GlobalInbox
/// folder ref-linked to it. Creation is all-or-nothing; repeat calls return
/// the same id.
pub async fn init_vault(conn: &mut PgConnection) -> DbResult<u32> {
    let rows = sqlx::query("SELECT idx FROM vault.\"Nodes\" WHERE \"NodeType\" = $1")
        .bind(NodeType::System as i32)
        .fetch_all(&mut *conn)
        .await?;
    match rows.len() {
        0 => {}
        1 => return Ok(rows[0].get::<i32, _>(0) as u32),
        count => {
            tracing::error!(count, "Multiple System nodes in the vault");
            return Ok(rows[0].get::<i32, _>(0) as u32);
        }
    }

    let mut tx = conn.begin().await?;
    let system = create_node(&mut tx, VaultNode::new_system()).await?;
    let inbox = create_node(
        &mut tx,
        VaultNode::new_folder(&Uuid::nil(), system, StandardNode::GlobalInboxFolder),
    )
    .await?;
    ref_node(&mut tx, system, inbox, 0).await?;
    tx.commit().await?;

    tracing::info!(system_node = system, "Initialized vault");
    Ok(system)
}

/// Build the node subgraph backing a fresh player and return the player node
/// id (which doubles as the player id).
pub async fn create_player(
    conn: &mut PgConnection,
    acct_uuid: &Uuid,
    player_name: &str,
    avatar_shape: &str,
    explorer: bool,
) -> DbResult<u32> {
    let mut tx = conn.begin().await?;

    let player = create_node(
        &mut tx,
        VaultNode::new_player(acct_uuid, player_name, avatar_shape, i32::from(explorer)),
    )
    .await?;

    let info = create_node(
        &mut tx,
        VaultNode::new_player_info(acct_uuid, player, player_name),
    )
    .await?;
    ref_node(&mut tx, player, info, 0).await?;

    for folder_type in [
        StandardNode::InboxFolder,
        StandardNode::BuddyListFolder,
        StandardNode::IgnoreListFolder,
        StandardNode::PlayerInviteFolder,
        StandardNode::AvatarOutfitFolder,
        StandardNode::AvatarClosetFolder,
        StandardNode::ChronicleFolder,
        StandardNode::AgeJournalsFolder,
    ] {
        let folder = create_node(&mut tx, VaultNode::new_folder(acct_uuid, player, folder_type))
            .await?;
        ref_node(&mut tx, player, folder, 0).await?;
    }

    for folder_type in [
        StandardNode::PeopleIKnowAboutFolder,
        StandardNode::CanVisitFolder,
    ] {
        let folder = create_node(
            &mut tx,
            VaultNode::new_player_info_list(acct_uuid, player, folder_type),
        )
        .await?;
        ref_node(&mut tx, player, folder, 0).await?;
    }

    for folder_type in [
        StandardNode::AgesIOwnFolder,
        StandardNode::AgesICanVisitFolder,
    ] {
        let folder = create_node(
            &mut tx,
            VaultNode::new_age_info_list(acct_uuid, player, folder_type),
        )
        .await?;
        ref_node(&mut tx, player, folder, 0).await?;
    }

    tx.commit().await?;
    Ok(player)
}

/// Result of an age initialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgeNodes {
    pub age_node: u32,
    pub age_info_node: u32,
    pub sdl_node: u32,
}

/// Find an existing age instance by uuid, or build a fresh subgraph for it.
/// All-or-nothing.
pub async fn init_age(
    conn: &mut PgConnection,
    sdl_db: &DescriptorDb,
    request: &crate::auth::AgeInitRequest,
) -> DbResult<AgeNodes> {
    // Reuse an existing instance if present.
    let existing = find_nodes(conn, &VaultNode::age_lookup(&request.instance_uuid)).await?;
    if let Some(&age_node) = existing.first() {
        let mut info_lookup = VaultNode::default();
        info_lookup.set_node_type(NodeType::AgeInfo as i32);
        info_lookup.set_uuid_1(request.instance_uuid);
        let infos = find_nodes(conn, &info_lookup).await?;
        let age_info_node = infos.first().copied().unwrap_or(0);

        let mut sdl_lookup = VaultNode::default();
        sdl_lookup.set_node_type(NodeType::Sdl as i32);
        sdl_lookup.set_creator_uuid(request.instance_uuid);
        let sdls = find_nodes(conn, &sdl_lookup).await?;
        return Ok(AgeNodes {
            age_node,
            age_info_node,
            sdl_node: sdls.first().copied().unwrap_or(0),
        });
    }

    let mut tx = conn.begin().await?;

    let age_node = create_node(
        &mut tx,
        VaultNode::new_age(&request.instance_uuid, &request.parent_uuid, &request.filename),
    )
    .await?;

    // Default age SDL for the instance, if a descriptor exists for the age.
    let sdl_blob = sdl_db
        .find_latest(&request.filename)
        .and_then(|descriptor| {
            State::from_defaults(sdl_db, descriptor)
                .and_then(|state| state.to_blob(sdl_db))
                .ok()
        })
        .unwrap_or_default();
    let sdl_node = create_node(
        &mut tx,
        VaultNode::new_sdl(&request.instance_uuid, age_node, &request.filename, &sdl_blob),
    )
    .await?;
    ref_node(&mut tx, age_node, sdl_node, 0).await?;

    for folder_type in [
        StandardNode::ChronicleFolder,
        StandardNode::AgeDevicesFolder,
    ] {
        let folder = create_node(
            &mut tx,
            VaultNode::new_folder(&request.instance_uuid, age_node, folder_type),
        )
        .await?;
        ref_node(&mut tx, age_node, folder, 0).await?;
    }
    for folder_type in [
        StandardNode::AgeOwnersFolder,
        StandardNode::CanVisitFolder,
        StandardNode::AgeMembersFolder,
    ] {
        let folder = create_node(
            &mut tx,
            VaultNode::new_player_info_list(&request.instance_uuid, age_node, folder_type),
        )
        .await?;
        ref_node(&mut tx, age_node, folder, 0).await?;
    }
    for folder_type in [StandardNode::SubAgesFolder, StandardNode::ChildAgesFolder] {
        let folder = create_node(
            &mut tx,
            VaultNode::new_age_info_list(&request.instance_uuid, age_node, folder_type),
        )
        .await?;
        ref_node(&mut tx, age_node, folder, 0).await?;
    }

    let age_info_node = create_node(
        &mut tx,
        VaultNode::new_age_info(
            &request.instance_uuid,
            age_node,
            request.sequence_number,
            false,
            request.language,
            &request.parent_uuid,
            &request.filename,
            &request.instance_name,
            &request.user_name,
            &request.description,
        ),
    )
    .await?;
    ref_node(&mut tx, age_node, age_info_node, 0).await?;

    tx.commit().await?;
    tracing::info!(
        filename = %request.filename,
        instance = %request.instance_uuid,
        age_node,
        "Initialized age instance"
    );
    Ok(AgeNodes {
        age_node,
        age_info_node,
        sdl_node,
    })
}

/// Flip the online flag on a player's PlayerInfo node.
pub async fn set_player_online(
    conn: &mut PgConnection,
    player_id: u32,
    online: bool,
) -> DbResult<()> {
    let mut template = VaultNode::default();
    template.set_node_type(NodeType::PlayerInfo as i32);
    template.set_uint32_1(player_id);
    for node_id in find_nodes(conn, &template).await? {
        let mut partial = VaultNode::default();
        partial.set_node_id(node_id);
        partial.set_int32_1(i32::from(online));
        update_node(conn, &partial).await?;
    }
    Ok(())
}

/// Account row fetched at login.
#[derive(Debug, Clone)]
pub struct AccountRow {
    pub pass_hash: String,
    pub acct_uuid: Uuid,
    pub acct_flags: u32,
    pub billing_type: u32,
}

pub async fn fetch_account(conn: &mut PgConnection, login: &str) -> DbResult<Option<AccountRow>> {
    let row = sqlx::query(
        "SELECT \"PassHash\", \"AcctUuid\", \"AcctFlags\", \"BillingType\" \
         FROM auth.\"Accounts\" WHERE LOWER(\"Login\") = LOWER($1)",
    )
    .bind(login)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|row| AccountRow {
        pass_hash: row.get::<String, _>(0),
        acct_uuid: row.get::<Uuid, _>(1),
        acct_flags: row.get::<i32, _>(2) as u32,
        billing_type: row.get::<i32, _>(3) as u32,
    }))
}

pub async fn insert_account(
    conn: &mut PgConnection,
    login: &str,
    pass_hash: &str,
    acct_uuid: &Uuid,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO auth.\"Accounts\" \
         (\"Login\", \"PassHash\", \"AcctUuid\", \"AcctFlags\", \"BillingType\") \
         VALUES ($1, $2, $3, 0, 1)",
    )
    .bind(login)
    .bind(pass_hash)
    .bind(acct_uuid)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn fetch_players(
    conn: &mut PgConnection,
    acct_uuid: &Uuid,
) -> DbResult<Vec<crate::auth::PlayerInfo>> {
    let rows = sqlx::query(
        "SELECT \"PlayerIdx\", \"PlayerName\", \"AvatarShape\", \"Explorer\" \
         FROM auth.\"Players\" WHERE \"AcctUuid\" = $1",
    )
    .bind(acct_uuid)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows
        .iter()
        .map(|row| crate::auth::PlayerInfo {
            player_id: row.get::<i32, _>(0) as u32,
            player_name: row.get::<String, _>(1),
            avatar_shape: row.get::<String, _>(2),
            explorer: row.get::<i32, _>(3) as u32,
        })
        .collect())
}

pub async fn fetch_player(
    conn: &mut PgConnection,
    acct_uuid: &Uuid,
    player_id: u32,
) -> DbResult<Option<crate::auth::PlayerInfo>> {
    let row = sqlx::query(
        "SELECT \"PlayerName\", \"AvatarShape\", \"Explorer\" \
         FROM auth.\"Players\" WHERE \"AcctUuid\" = $1 AND \"PlayerIdx\" = $2",
    )
    .bind(acct_uuid)
    .bind(player_id as i32)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|row| crate::auth::PlayerInfo {
        player_id,
        player_name: row.get::<String, _>(0),
        avatar_shape: row.get::<String, _>(1),
        explorer: row.get::<i32, _>(2) as u32,
    }))
}

pub async fn player_name_taken(conn: &mut PgConnection, player_name: &str) -> DbResult<bool> {
    let row = sqlx::query("SELECT idx FROM auth.\"Players\" WHERE \"PlayerName\" = $1")
        .bind(player_name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

pub async fn insert_player(
    conn: &mut PgConnection,
    acct_uuid: &Uuid,
    player_id: u32,
    player_name: &str,
    avatar_shape: &str,
    explorer: bool,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO auth.\"Players\" \
         (\"AcctUuid\", \"PlayerIdx\", \"PlayerName\", \"AvatarShape\", \"Explorer\") \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(acct_uuid)
    .bind(player_id as i32)
    .bind(player_name)
    .bind(avatar_shape)
    .bind(i32::from(explorer))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete_player(
    conn: &mut PgConnection,
    acct_uuid: &Uuid,
    player_id: u32,
) -> DbResult<bool> {
    let result = sqlx::query(
        "DELETE FROM auth.\"Players\" WHERE \"AcctUuid\" = $1 AND \"PlayerIdx\" = $2",
    )
    .bind(acct_uuid)
    .bind(player_id as i32)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Look up or register the game server row for an age instance.
pub async fn find_game_server(
    conn: &mut PgConnection,
    instance_uuid: &Uuid,
    filename: &str,
    age_node: u32,
    sdl_node: u32,
) -> DbResult<u32> {
    let row = sqlx::query("SELECT idx FROM game.\"Servers\" WHERE \"AgeUuid\" = $1")
        .bind(instance_uuid)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(row) = row {
        return Ok(row.get::<i32, _>(0) as u32);
    }

    let row = sqlx::query(
        "INSERT INTO game.\"Servers\" (\"AgeUuid\", \"AgeFilename\", \"AgeIdx\", \"SdlIdx\") \
         VALUES ($1, $2, $3, $4) RETURNING idx",
    )
    .bind(instance_uuid)
    .bind(filename)
    .bind(age_node as i32)
    .bind(sdl_node as i32)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.get::<i32, _>(0) as u32)
}

/// Public age listing for the given filename.
pub async fn fetch_public_ages(
    conn: &mut PgConnection,
    filename: &str,
) -> DbResult<Vec<VaultNode>> {
    let mut template = VaultNode::default();
    template.set_node_type(NodeType::AgeInfo as i32);
    template.set_int32_2(1);
    template.set_string64_2(filename);

    let ids = find_nodes(conn, &template).await?;
    let mut ages = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(node) = fetch_node(conn, id).await? {
            ages.push(node);
        }
    }
    Ok(ages)
}

pub async fn set_age_public(
    conn: &mut PgConnection,
    age_info_node: u32,
    public: bool,
) -> DbResult<bool> {
    let mut partial = VaultNode::default();
    partial.set_node_id(age_info_node);
    partial.set_int32_2(i32::from(public));
    update_node(conn, &partial).await
}
