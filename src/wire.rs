use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tracing::debug;

use crate::auth::LodgeAuthSource;
use crate::engine::{Engine, EngineError, now_ms};
use crate::limits::DEFAULT_RESERVATION_TTL_MS;
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command, SqlError};
use crate::tenant::TenantManager;

pub struct LodgeHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<LodgeQueryParser>,
}

impl LodgeHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(LodgeQueryParser),
        }
    }

    /// The connection's database name selects the tenant.
    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    /// Execute with query metrics recorded.
    async fn run(&self, engine: &Engine, cmd: Command, format: &Format) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let start = Instant::now();
        let result = self.execute_command(engine, cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
        format: &Format,
    ) -> PgWireResult<Vec<Response>> {
        let response = match cmd {
            // ── hotels ──
            Command::InsertHotel {
                id,
                name,
                location,
                description,
                stars,
            } => {
                engine
                    .create_hotel(id, name, location, description, stars)
                    .await
                    .map_err(engine_err)?;
                executed("INSERT", 1)
            }
            Command::UpdateHotel { id, patch } => {
                engine.update_hotel(id, patch).await.map_err(engine_err)?;
                executed("UPDATE", 1)
            }
            Command::DeleteHotel { id } => {
                engine.delete_hotel(id).await.map_err(engine_err)?;
                executed("DELETE", 1)
            }
            Command::SelectHotels { id } => {
                let hotels = match id {
                    Some(id) => engine.get_hotel(id).await.into_iter().collect(),
                    None => engine.list_hotels().await,
                };
                query_response(HOTEL_COLUMNS, format, &hotels, encode_hotel)
            }

            // ── rooms ──
            Command::InsertRoom {
                id,
                hotel_id,
                room_type,
                price_per_night,
                max_guests,
                units,
            } => {
                engine
                    .create_room(id, hotel_id, room_type, price_per_night, max_guests, units)
                    .await
                    .map_err(engine_err)?;
                executed("INSERT", 1)
            }
            Command::UpdateRoom { id, patch } => {
                engine.update_room(id, patch).await.map_err(engine_err)?;
                executed("UPDATE", 1)
            }
            Command::DeleteRoom { id } => {
                engine.delete_room(id).await.map_err(engine_err)?;
                executed("DELETE", 1)
            }
            Command::SelectRooms { id, hotel_id } => {
                let rooms: Vec<Room> = match id {
                    Some(id) => engine
                        .get_room(id)
                        .await
                        .into_iter()
                        .filter(|r| hotel_id.is_none_or(|h| r.hotel_id == h))
                        .collect(),
                    None => engine.list_rooms(hotel_id).await,
                };
                query_response(ROOM_COLUMNS, format, &rooms, encode_room)
            }

            // ── users ──
            Command::InsertUser {
                id,
                email,
                full_name,
                phone,
                role,
            } => {
                engine
                    .create_user(id, email, full_name, phone, role)
                    .await
                    .map_err(engine_err)?;
                executed("INSERT", 1)
            }
            Command::UpdateUser { id, patch } => {
                engine.update_user(id, patch).await.map_err(engine_err)?;
                executed("UPDATE", 1)
            }
            Command::DeleteUser { id } => {
                engine.delete_user(id).await.map_err(engine_err)?;
                executed("DELETE", 1)
            }
            Command::SelectUsers { id } => {
                let users = match id {
                    Some(id) => engine.get_user(id).into_iter().collect(),
                    None => engine.list_users(),
                };
                query_response(USER_COLUMNS, format, &users, encode_user)
            }

            // ── closures ──
            Command::InsertClosure {
                id,
                target_id,
                start,
                end,
            } => {
                let span = span_of(start, end)?;
                engine.add_closure(id, target_id, span).await.map_err(engine_err)?;
                executed("INSERT", 1)
            }
            Command::DeleteClosure { id } => {
                engine.remove_closure(id).await.map_err(engine_err)?;
                executed("DELETE", 1)
            }
            Command::SelectClosures { target_id } => {
                let closures = engine.list_closures(target_id).await.map_err(engine_err)?;
                query_response(CLOSURE_COLUMNS, format, &closures, |enc, c| {
                    enc.encode_field(&c.id.to_string())?;
                    enc.encode_field(&c.target_id.to_string())?;
                    enc.encode_field(&c.start)?;
                    enc.encode_field(&c.end)
                })
            }

            // ── reservations ──
            Command::InsertReservation { stay, expires_at } => {
                let expires_at = expires_at.unwrap_or_else(|| now_ms() + DEFAULT_RESERVATION_TTL_MS);
                engine
                    .place_reservation(stay, expires_at)
                    .await
                    .map_err(engine_err)?;
                executed("INSERT", 1)
            }
            Command::DeleteReservation { id } => {
                engine.release_reservation(id).await.map_err(engine_err)?;
                executed("DELETE", 1)
            }
            Command::SelectReservations { room_id, user_id } => {
                let reservations = engine.list_reservations(room_id, user_id).await;
                query_response(RESERVATION_COLUMNS, format, &reservations, |enc, r| {
                    enc.encode_field(&r.id.to_string())?;
                    enc.encode_field(&r.room_id.to_string())?;
                    enc.encode_field(&r.user_id.to_string())?;
                    enc.encode_field(&r.check_in)?;
                    enc.encode_field(&r.check_out)?;
                    enc.encode_field(&(r.guests as i32))?;
                    enc.encode_field(&r.expires_at)
                })
            }

            // ── bookings ──
            Command::InsertBooking(stay) => {
                engine.create_booking(stay).await.map_err(engine_err)?;
                executed("INSERT", 1)
            }
            Command::BatchInsertBookings(stays) => {
                let created = engine.batch_create_bookings(stays).await.map_err(engine_err)?;
                executed("INSERT", created.len())
            }
            Command::ConfirmReservation {
                booking_id,
                reservation_id,
            } => {
                engine
                    .confirm_reservation(reservation_id, booking_id)
                    .await
                    .map_err(engine_err)?;
                executed("INSERT", 1)
            }
            Command::UpdateBookingStatus { id, status } => {
                engine.set_booking_status(id, status).await.map_err(engine_err)?;
                executed("UPDATE", 1)
            }
            Command::DeleteBooking { id } => {
                engine.cancel_booking(id).await.map_err(engine_err)?;
                executed("DELETE", 1)
            }
            Command::SelectBookings(filter) => {
                let bookings = match filter {
                    BookingFilter::Id(id) => engine.get_booking(id).into_iter().collect(),
                    other => engine.list_bookings(other),
                };
                query_response(BOOKING_COLUMNS, format, &bookings, encode_booking)
            }

            // ── notifications ──
            Command::InsertNotification {
                id,
                user_id,
                title,
                message,
            } => {
                engine
                    .create_notification(id, user_id, title, message)
                    .await
                    .map_err(engine_err)?;
                executed("INSERT", 1)
            }
            Command::UpdateNotification { id, read } => {
                engine.mark_notification_read(id, read).await.map_err(engine_err)?;
                executed("UPDATE", 1)
            }
            Command::DeleteNotification { id } => {
                engine.delete_notification(id).await.map_err(engine_err)?;
                executed("DELETE", 1)
            }
            Command::SelectNotifications { user_id } => {
                let notifications = engine.list_notifications(user_id);
                query_response(NOTIFICATION_COLUMNS, format, &notifications, |enc, n| {
                    enc.encode_field(&n.id.to_string())?;
                    enc.encode_field(&n.user_id.to_string())?;
                    enc.encode_field(&n.title)?;
                    enc.encode_field(&n.message)?;
                    enc.encode_field(&n.read)?;
                    enc.encode_field(&n.created_at)
                })
            }

            // ── availability & dashboard ──
            Command::SelectAvailability {
                room_id,
                start,
                end,
                min_nights,
            } => {
                let free = engine
                    .room_availability(room_id, span_of(start, end)?, min_nights)
                    .await
                    .map_err(engine_err)?;
                let rid = room_id.to_string();
                query_response(AVAILABILITY_COLUMNS, format, &free, |enc, slot| {
                    enc.encode_field(&rid)?;
                    enc.encode_field(&slot.start)?;
                    enc.encode_field(&slot.end)
                })
            }
            Command::SelectAvailableRooms {
                hotel_id,
                start,
                end,
                guests,
            } => {
                let rooms = engine
                    .available_rooms(hotel_id, span_of(start, end)?, guests)
                    .await
                    .map_err(engine_err)?;
                query_response(ROOM_COLUMNS, format, &rooms, encode_room)
            }
            Command::SelectDashboard { hotel_id } => {
                let stats = engine.dashboard(hotel_id).await.map_err(engine_err)?;
                query_response(DASHBOARD_COLUMNS, format, &[stats], |enc, s| {
                    for count in [
                        s.hotels,
                        s.rooms,
                        s.users,
                        s.bookings,
                        s.active_bookings,
                        s.completed_bookings,
                        s.cancelled_bookings,
                        s.reservations,
                    ] {
                        enc.encode_field(&i32::try_from(count).unwrap_or(i32::MAX))?;
                    }
                    enc.encode_field(&s.revenue)
                })
            }
        };
        Ok(vec![response])
    }
}

fn executed(tag: &str, rows: usize) -> Response {
    Response::Execution(Tag::new(tag).with_rows(rows))
}

fn span_of(start: Ms, end: Ms) -> PgWireResult<Span> {
    if start >= end {
        return Err(sql_err(SqlError::Parse("start must be before end".into())));
    }
    Ok(Span::new(start, end))
}

/// Encode `items` as one result set.
fn query_response<T>(
    columns: Columns,
    format: &Format,
    items: &[T],
    encode: impl Fn(&mut DataRowEncoder, &T) -> PgWireResult<()>,
) -> Response {
    let schema = Arc::new(fields(columns, format));
    let rows: Vec<PgWireResult<_>> = items
        .iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn encode_hotel(enc: &mut DataRowEncoder, h: &Hotel) -> PgWireResult<()> {
    enc.encode_field(&h.id.to_string())?;
    enc.encode_field(&h.name)?;
    enc.encode_field(&h.location)?;
    enc.encode_field(&h.description)?;
    enc.encode_field(&h.stars.map(i32::from))?;
    enc.encode_field(&h.created_at)
}

fn encode_room(enc: &mut DataRowEncoder, r: &Room) -> PgWireResult<()> {
    enc.encode_field(&r.id.to_string())?;
    enc.encode_field(&r.hotel_id.to_string())?;
    enc.encode_field(&r.room_type)?;
    enc.encode_field(&r.price_per_night)?;
    enc.encode_field(&(r.max_guests as i32))?;
    enc.encode_field(&(r.units as i32))?;
    enc.encode_field(&r.available)?;
    enc.encode_field(&r.created_at)
}

fn encode_user(enc: &mut DataRowEncoder, u: &User) -> PgWireResult<()> {
    enc.encode_field(&u.id.to_string())?;
    enc.encode_field(&u.email)?;
    enc.encode_field(&u.full_name)?;
    enc.encode_field(&u.phone)?;
    enc.encode_field(&u.role.as_str().to_string())?;
    enc.encode_field(&u.created_at)
}

fn encode_booking(enc: &mut DataRowEncoder, b: &Booking) -> PgWireResult<()> {
    enc.encode_field(&b.id.to_string())?;
    enc.encode_field(&b.room_id.to_string())?;
    enc.encode_field(&b.hotel_id.to_string())?;
    enc.encode_field(&b.user_id.to_string())?;
    enc.encode_field(&b.span.start)?;
    enc.encode_field(&b.span.end)?;
    enc.encode_field(&(b.span.nights() as i32))?;
    enc.encode_field(&(b.guests as i32))?;
    enc.encode_field(&b.total_price)?;
    enc.encode_field(&b.status.as_str().to_string())?;
    enc.encode_field(&b.created_at)?;
    enc.encode_field(&b.updated_at)
}

// ── Result schemas ───────────────────────────────────────────────

/// Result columns of one table.
pub(crate) type Columns = &'static [(&'static str, ColumnType)];

/// Result column types. Kept separate from `Type` so the lists can be `static`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnType {
    Text,
    Int4,
    Int8,
    Bool,
}

impl ColumnType {
    fn pg_type(self) -> Type {
        match self {
            ColumnType::Text => Type::VARCHAR,
            ColumnType::Int4 => Type::INT4,
            ColumnType::Int8 => Type::INT8,
            ColumnType::Bool => Type::BOOL,
        }
    }
}

fn fields(columns: Columns, format: &Format) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            FieldInfo::new((*name).into(), None, None, ty.pg_type(), format.format_for(i))
        })
        .collect()
}

use ColumnType::{Bool, Int4, Int8, Text};

static HOTEL_COLUMNS: Columns = &[
    ("id", Text),
    ("name", Text),
    ("location", Text),
    ("description", Text),
    ("stars", Int4),
    ("created_at", Int8),
];

static ROOM_COLUMNS: Columns = &[
    ("id", Text),
    ("hotel_id", Text),
    ("room_type", Text),
    ("price_per_night", Int8),
    ("max_guests", Int4),
    ("units", Int4),
    ("available", Bool),
    ("created_at", Int8),
];

static USER_COLUMNS: Columns = &[
    ("id", Text),
    ("email", Text),
    ("full_name", Text),
    ("phone", Text),
    ("role", Text),
    ("created_at", Int8),
];

static CLOSURE_COLUMNS: Columns = &[
    ("id", Text),
    ("target_id", Text),
    ("start", Int8),
    ("end", Int8),
];

static RESERVATION_COLUMNS: Columns = &[
    ("id", Text),
    ("room_id", Text),
    ("user_id", Text),
    ("check_in", Int8),
    ("check_out", Int8),
    ("guests", Int4),
    ("expires_at", Int8),
];

static BOOKING_COLUMNS: Columns = &[
    ("id", Text),
    ("room_id", Text),
    ("hotel_id", Text),
    ("user_id", Text),
    ("check_in", Int8),
    ("check_out", Int8),
    ("nights", Int4),
    ("guests", Int4),
    ("total_price", Int8),
    ("status", Text),
    ("created_at", Int8),
    ("updated_at", Int8),
];

static NOTIFICATION_COLUMNS: Columns = &[
    ("id", Text),
    ("user_id", Text),
    ("title", Text),
    ("message", Text),
    ("read", Bool),
    ("created_at", Int8),
];

static AVAILABILITY_COLUMNS: Columns = &[("room_id", Text), ("check_in", Int8), ("check_out", Int8)];

static DASHBOARD_COLUMNS: Columns = &[
    ("hotels", Int4),
    ("rooms", Int4),
    ("users", Int4),
    ("bookings", Int4),
    ("active_bookings", Int4),
    ("completed_bookings", Int4),
    ("cancelled_bookings", Int4),
    ("reservations", Int4),
    ("revenue", Int8),
];

/// Columns a SELECT returns, or none for statements without a result set.
fn result_columns(sql: &str) -> Columns {
    match sql::select_table(sql).as_deref() {
        Some("hotels") => HOTEL_COLUMNS,
        Some("rooms" | "available_rooms") => ROOM_COLUMNS,
        Some("users") => USER_COLUMNS,
        Some("closures") => CLOSURE_COLUMNS,
        Some("reservations") => RESERVATION_COLUMNS,
        Some("bookings") => BOOKING_COLUMNS,
        Some("notifications") => NOTIFICATION_COLUMNS,
        Some("availability") => AVAILABILITY_COLUMNS,
        Some("dashboard") => DASHBOARD_COLUMNS,
        _ => &[],
    }
}

#[async_trait]
impl SimpleQueryHandler for LodgeHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.run(&engine, cmd, &Format::UnifiedText).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct LodgeQueryParser;

#[async_trait]
impl QueryParser for LodgeQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        let format = column_format.unwrap_or(&Format::UnifiedText);
        Ok(fields(result_columns(stmt), format))
    }
}

#[async_trait]
impl ExtendedQueryHandler for LodgeHandler {
    type Statement = String;
    type QueryParser = LodgeQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        self.run(&engine, cmd, &portal.result_column_format)
            .await?
            .pop()
            .ok_or_else(|| sql_err(SqlError::Empty))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            fields(result_columns(&target.statement), &Format::UnifiedText),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(fields(
            result_columns(&target.statement.statement),
            &target.result_column_format,
        )))
    }
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Inline bound text parameters as quoted literals.
fn substitute_params(portal: &Portal<String>) -> String {
    inline_params(&portal.statement.statement, &portal.parameters)
}

/// Replace each `$N` with the N-th parameter in one left-to-right pass.
/// Inserted values are never rescanned. Unknown placeholders are kept as written.
fn inline_params(sql: &str, params: &[Option<bytes::Bytes>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        let param = after[..digits]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| params.get(i));
        match param {
            Some(Some(bytes)) => {
                out.push('\'');
                out.push_str(&String::from_utf8_lossy(bytes).replace('\'', "''"));
                out.push('\'');
            }
            Some(None) => out.push_str("NULL"),
            None => out.push_str(&rest[pos..pos + 1 + digits]),
        }
        rest = &after[digits..];
    }
    out.push_str(rest);
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct LodgeFactory {
    handler: Arc<LodgeHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<LodgeAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl LodgeFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = LodgeAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(LodgeHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for LodgeFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = LodgeFactory::new(tenant_manager, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

/// SQLSTATE for each engine failure.
fn engine_code(e: &EngineError) -> &'static str {
    match e {
        EngineError::NotFound(_) => "P0002",
        EngineError::AlreadyExists(_) | EngineError::EmailTaken(_) => "23505",
        EngineError::Conflict(_)
        | EngineError::CapacityExceeded(_)
        | EngineError::Closed(_) => "23P01",
        EngineError::HasChildren(_) | EngineError::HasAllocations(_) => "23503",
        EngineError::TooManyGuests { .. } | EngineError::Invalid(_) => "22023",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) => "58030",
        EngineError::Expired(_) | EngineError::InvalidTransition { .. } => "P0001",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    debug!("engine error: {e}");
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        engine_code(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_highest_placeholder() {
        assert_eq!(count_params("SELECT * FROM hotels"), 0);
        assert_eq!(count_params("SELECT * FROM rooms WHERE hotel_id = $1"), 1);
        assert_eq!(
            count_params("INSERT INTO bookings VALUES ($1, $2, $3, $4, $5, $6)"),
            6
        );
        assert_eq!(count_params("SELECT $3, $1"), 3);
        assert_eq!(count_params("SELECT '$' FROM x"), 0);
    }

    #[test]
    fn inlines_quoted_parameters() {
        let params = vec![
            Some(bytes::Bytes::from_static(b"01ARZ3NDEKTSV4RRFFQ69G5FAV")),
            Some(bytes::Bytes::from_static(b"O'Brien")),
            None,
        ];
        let sql = inline_params("UPDATE users SET full_name = $2, phone = $3 WHERE id = $1", &params);
        assert_eq!(
            sql,
            "UPDATE users SET full_name = 'O''Brien', phone = NULL WHERE id = '01ARZ3NDEKTSV4RRFFQ69G5FAV'"
        );
    }

    #[test]
    fn double_digit_placeholders_survive() {
        let params: Vec<_> = (1..=10)
            .map(|i| Some(bytes::Bytes::from(i.to_string())))
            .collect();
        assert_eq!(inline_params("$1 $10", &params), "'1' '10'");
    }

    #[test]
    fn bound_values_are_not_rescanned() {
        let params = vec![
            Some(bytes::Bytes::from_static(b"01ARZ3NDEKTSV4RRFFQ69G5FAV")),
            Some(bytes::Bytes::from_static(b"pay $1 now")),
        ];
        assert_eq!(
            inline_params("UPDATE users SET full_name = $2 WHERE id = $1", &params),
            "UPDATE users SET full_name = 'pay $1 now' WHERE id = '01ARZ3NDEKTSV4RRFFQ69G5FAV'"
        );
        assert_eq!(inline_params("SELECT $0, $7, $", &params), "SELECT $0, $7, $");
    }

    #[test]
    fn dashboard_counts_are_int4() {
        let columns = result_columns("SELECT * FROM dashboard");
        for (name, ty) in columns.iter() {
            let expected = if *name == "revenue" { ColumnType::Int8 } else { ColumnType::Int4 };
            assert_eq!(*ty, expected, "{name}");
        }
    }

    #[test]
    fn describe_picks_table_schema() {
        let names = |sql: &str| -> Vec<&str> { result_columns(sql).iter().map(|(n, _)| *n).collect() };
        assert_eq!(names("SELECT * FROM dashboard").len(), 9);
        assert_eq!(names("SELECT * FROM available_rooms WHERE hotel_id = $1")[0], "id");
        assert!(names("DELETE FROM hotels WHERE id = $1").is_empty());
        assert!(names("SELECT * FROM bookings WHERE user_id = $1").contains(&"total_price"));
    }

    #[test]
    fn engine_errors_map_to_sqlstate() {
        let id = ulid::Ulid::new();
        assert_eq!(engine_code(&EngineError::NotFound(id)), "P0002");
        assert_eq!(engine_code(&EngineError::Conflict(id)), "23P01");
        assert_eq!(engine_code(&EngineError::EmailTaken("a@b".into())), "23505");
        assert_eq!(engine_code(&EngineError::HasAllocations(id)), "23503");
    }
}
