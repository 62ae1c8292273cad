//! Room creation, joining and listing.

use crate::error::{JoinError, ValidationError};
use crate::model::{decode_records, now_millis, Room, RoomId, UserId};
use crate::store::{paths, RemoteStore, StoreResult};
use serde_json::{json, Value};
use std::cmp::Ordering;
use uuid::Uuid;

/// A uniformly random id in 100000..=999999.
pub fn generate_room_id() -> RoomId {
    let n = 100_000 + (Uuid::new_v4().as_u128() % 900_000) as u32;
    RoomId::from_digits(n)
}

/// Keep only digits from typed input, at most six of them.
pub fn sanitize_room_id_input(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(RoomId::LEN)
        .collect()
}

/// Exactly six ASCII digits.
pub fn validate_room_id(input: &str) -> Result<RoomId, ValidationError> {
    RoomId::parse(input)
}

/// Create a room hosted by `host` at a fresh id.
pub async fn create_room(store: &dyn RemoteStore, host: &UserId) -> StoreResult<Room> {
    let id = generate_room_id();
    create_room_with_id(store, &id, host).await
}

/// Write room metadata at `id`, replacing whatever was there.
pub async fn create_room_with_id(store: &dyn RemoteStore, id: &RoomId, host: &UserId) -> StoreResult<Room> {
    let created_at = now_millis();
    store
        .set(
            &paths::room(id),
            json!({
                "hostId": host.as_str(),
                "createdAt": created_at,
                "strokes": {},
            }),
        )
        .await?;
    log::info!("Created room {} for host {}", id, host);
    Ok(Room {
        id: id.to_string(),
        host_id: host.clone(),
        created_at,
    })
}

/// Validate `input` and confirm the room exists.
pub async fn join_room(store: &dyn RemoteStore, input: &str) -> Result<Room, JoinError> {
    let id = RoomId::parse(input)?;
    let value = store.get(&paths::room(&id)).await?;
    let Some(value) = value else {
        return Err(JoinError::RoomNotFound(id));
    };
    let mut room: Room = serde_json::from_value(value).map_err(|e| {
        log::warn!("Room {} has malformed metadata: {}", id, e);
        JoinError::RoomNotFound(id.clone())
    })?;
    room.id = id.to_string();
    Ok(room)
}

async fn all_rooms(store: &dyn RemoteStore) -> StoreResult<Vec<Room>> {
    let value = store.get(&paths::rooms()).await?;
    let decoded = decode_records::<Room>(value.as_ref());
    for (id, reason) in &decoded.rejected {
        log::warn!("Skipping room {}: {}", id, reason);
    }
    Ok(decoded.records.into_values().collect())
}

fn by_created_at(a: &Room, b: &Room) -> Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

/// The `limit` oldest rooms, oldest first.
pub async fn first_rooms_by_created_at(store: &dyn RemoteStore, limit: usize) -> StoreResult<Vec<Room>> {
    let mut rooms = all_rooms(store).await?;
    rooms.sort_by(by_created_at);
    rooms.truncate(limit);
    Ok(rooms)
}

/// Rooms with `start <= createdAt <= end`, oldest first.
pub async fn rooms_created_between(store: &dyn RemoteStore, start: i64, end: i64) -> StoreResult<Vec<Room>> {
    let mut rooms: Vec<Room> = all_rooms(store)
        .await?
        .into_iter()
        .filter(|room| (start..=end).contains(&room.created_at))
        .collect();
    rooms.sort_by(by_created_at);
    Ok(rooms)
}

/// Rooms hosted by `host`, in key order.
pub async fn rooms_by_host(store: &dyn RemoteStore, host: &UserId) -> StoreResult<Vec<Room>> {
    Ok(all_rooms(store)
        .await?
        .into_iter()
        .filter(|room| &room.host_id == host)
        .collect())
}

/// The `limit` rooms with the greatest keys, in key order.
pub async fn last_rooms_by_key(store: &dyn RemoteStore, limit: usize) -> StoreResult<Vec<Room>> {
    let rooms = all_rooms(store).await?;
    let skip = rooms.len().saturating_sub(limit);
    Ok(rooms.into_iter().skip(skip).collect())
}

/// Rank of a JSON type when ordering by value: null, booleans, numbers,
/// strings, then containers.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) | Value::Object(_) => 4,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Entries under `onlineUsers`, ordered by value then key.
pub async fn online_users(store: &dyn RemoteStore) -> StoreResult<Vec<(UserId, Value)>> {
    let value = store.get(&paths::online_users()).await?;
    let mut users: Vec<(UserId, Value)> = match value {
        Some(Value::Object(map)) => map.into_iter().map(|(k, v)| (UserId::new(k), v)).collect(),
        _ => Vec::new(),
    };
    users.sort_by(|(ka, va), (kb, vb)| compare_values(va, vb).then_with(|| ka.cmp(kb)));
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StorePath};
    use pollster::block_on;

    #[test]
    fn test_validate_room_id() {
        assert_eq!(validate_room_id("042137").unwrap().as_str(), "042137");
        assert_eq!(validate_room_id("12345"), Err(ValidationError::RoomIdLength(5)));
        assert_eq!(validate_room_id("12a456"), Err(ValidationError::RoomIdNotNumeric));
    }

    fn seed_room(store: &MemoryStore, id: &str, host: &str, created_at: i64) {
        block_on(store.set(
            &StorePath::new("rooms").child(id),
            json!({"hostId": host, "createdAt": created_at}),
        ))
        .unwrap();
    }

    #[test]
    fn test_generate_room_id_range() {
        for _ in 0..500 {
            let id = generate_room_id();
            let n: u32 = id.as_str().parse().unwrap();
            assert!((100_000..=999_999).contains(&n));
        }
    }

    #[test]
    fn test_sanitize_input() {
        assert_eq!(sanitize_room_id_input("12-34 56"), "123456");
        assert_eq!(sanitize_room_id_input("1234567890"), "123456");
        assert_eq!(sanitize_room_id_input("abc"), "");
    }

    #[test]
    fn test_create_then_join() {
        let store = MemoryStore::new();
        let host = UserId::new("h");
        let room = block_on(create_room(&store, &host)).unwrap();

        let joined = block_on(join_room(&store, &room.id)).unwrap();
        assert_eq!(joined.host_id, host);
        assert_eq!(joined.id, room.id);
        assert_eq!(joined.created_at, room.created_at);
    }

    #[test]
    fn test_join_rejects_bad_ids() {
        let store = MemoryStore::new();
        assert!(matches!(
            block_on(join_room(&store, "12345")),
            Err(JoinError::InvalidRoomId(ValidationError::RoomIdLength(5)))
        ));
        assert!(matches!(
            block_on(join_room(&store, "654321")),
            Err(JoinError::RoomNotFound(id)) if id.as_str() == "654321"
        ));
    }

    #[test]
    fn test_listing_helpers() {
        let store = MemoryStore::new();
        seed_room(&store, "300000", "a", 30);
        seed_room(&store, "100000", "b", 20);
        seed_room(&store, "200000", "a", 10);

        let first = block_on(first_rooms_by_created_at(&store, 2)).unwrap();
        let ids: Vec<&str> = first.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["200000", "100000"]);

        let between = block_on(rooms_created_between(&store, 15, 30)).unwrap();
        assert_eq!(between.len(), 2);

        let hosted = block_on(rooms_by_host(&store, &UserId::new("a"))).unwrap();
        let ids: Vec<&str> = hosted.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["200000", "300000"]);

        let last = block_on(last_rooms_by_key(&store, 1)).unwrap();
        assert_eq!(last[0].id, "300000");
        assert_eq!(block_on(last_rooms_by_key(&store, 10)).unwrap().len(), 3);
    }

    #[test]
    fn test_online_users_ordered_by_value() {
        let store = MemoryStore::new();
        block_on(store.set(
            &paths::online_users(),
            json!({"u1": 30, "u2": true, "u3": "x", "u4": 5}),
        ))
        .unwrap();

        let users = block_on(online_users(&store)).unwrap();
        let ids: Vec<&str> = users.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["u2", "u4", "u1", "u3"]);
    }
}
