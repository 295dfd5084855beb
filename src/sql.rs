use sqlparser::ast::{
    self, AssignmentTarget, BinaryOperator, Expr, FromTable, ObjectNamePart, SetExpr, Statement,
    TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertHotel {
        id: Ulid,
        name: String,
        location: String,
        description: Option<String>,
        stars: Option<u8>,
    },
    UpdateHotel {
        id: Ulid,
        patch: HotelPatch,
    },
    DeleteHotel {
        id: Ulid,
    },
    SelectHotels {
        id: Option<Ulid>,
    },
    InsertRoom {
        id: Ulid,
        hotel_id: Ulid,
        room_type: String,
        price_per_night: i64,
        max_guests: u32,
        units: u32,
    },
    UpdateRoom {
        id: Ulid,
        patch: RoomPatch,
    },
    DeleteRoom {
        id: Ulid,
    },
    SelectRooms {
        id: Option<Ulid>,
        hotel_id: Option<Ulid>,
    },
    InsertUser {
        id: Ulid,
        email: String,
        full_name: String,
        phone: Option<String>,
        role: Role,
    },
    UpdateUser {
        id: Ulid,
        patch: UserPatch,
    },
    DeleteUser {
        id: Ulid,
    },
    SelectUsers {
        id: Option<Ulid>,
    },
    InsertClosure {
        id: Ulid,
        target_id: Ulid,
        start: Ms,
        end: Ms,
    },
    DeleteClosure {
        id: Ulid,
    },
    SelectClosures {
        target_id: Ulid,
    },
    InsertReservation {
        stay: StayRequest,
        /// Server default applies when absent.
        expires_at: Option<Ms>,
    },
    DeleteReservation {
        id: Ulid,
    },
    SelectReservations {
        room_id: Option<Ulid>,
        user_id: Option<Ulid>,
    },
    InsertBooking(StayRequest),
    BatchInsertBookings(Vec<StayRequest>),
    ConfirmReservation {
        booking_id: Ulid,
        reservation_id: Ulid,
    },
    UpdateBookingStatus {
        id: Ulid,
        status: BookingStatus,
    },
    DeleteBooking {
        id: Ulid,
    },
    SelectBookings(BookingFilter),
    InsertNotification {
        id: Ulid,
        user_id: Ulid,
        title: String,
        message: String,
    },
    UpdateNotification {
        id: Ulid,
        read: bool,
    },
    DeleteNotification {
        id: Ulid,
    },
    SelectNotifications {
        user_id: Option<Ulid>,
    },
    SelectAvailability {
        room_id: Ulid,
        start: Ms,
        end: Ms,
        min_nights: Option<i64>,
    },
    SelectAvailableRooms {
        hotel_id: Ulid,
        start: Ms,
        end: Ms,
        guests: Option<u32>,
    },
    SelectDashboard {
        hotel_id: Option<Ulid>,
    },
}

/// Column order used when an INSERT omits its column list.
fn default_columns(table: &str) -> Option<&'static [&'static str]> {
    Some(match table {
        "hotels" => &["id", "name", "location", "description", "stars"],
        "rooms" => &["id", "hotel_id", "room_type", "price_per_night", "max_guests", "units"],
        "users" => &["id", "email", "full_name", "phone", "role"],
        "closures" => &["id", "target_id", "start", "end"],
        "reservations" => &["id", "room_id", "user_id", "check_in", "check_out", "guests", "expires_at"],
        "bookings" => &["id", "room_id", "user_id", "check_in", "check_out", "guests"],
        "notifications" => &["id", "user_id", "title", "message"],
        _ => return None,
    })
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let stmt = parse_single(sql)?;
    match &stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table.relation, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_single(sql: &str) -> Result<Statement, SqlError> {
    let dialect = PostgreSqlDialect {};
    let mut stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    match stmts.len() {
        0 => Err(SqlError::Empty),
        1 => Ok(stmts.swap_remove(0)),
        n => Err(SqlError::Unsupported(format!("{n} statements in one query"))),
    }
}

/// Table a SELECT reads from, for describing result columns before execution.
pub fn select_table(sql: &str) -> Option<String> {
    match parse_single(sql).ok()? {
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(select) => select
                .from
                .first()
                .and_then(|t| table_factor_name(&t.relation).ok()),
            _ => None,
        },
        _ => None,
    }
}

// ── INSERT ────────────────────────────────────────────────────

/// One VALUES row, addressed by column name.
struct Row<'a> {
    table: &'static str,
    columns: &'a [String],
    values: &'a [Expr],
}

impl<'a> Row<'a> {
    fn new(table: &'static str, columns: &'a [String], values: &'a [Expr]) -> Result<Self, SqlError> {
        if values.len() != columns.len() {
            return Err(SqlError::WrongArity(table, columns.len(), values.len()));
        }
        Ok(Self {
            table,
            columns,
            values,
        })
    }

    /// The value for `col`, with SQL NULL treated as absent.
    fn get(&self, col: &str) -> Option<&'a Expr> {
        let pos = self.columns.iter().position(|c| c == col)?;
        self.values.get(pos).filter(|e| !is_null(e))
    }

    fn required(&self, col: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(col).ok_or(SqlError::MissingColumn(self.table, col))
    }

    fn ulid(&self, col: &'static str) -> Result<Ulid, SqlError> {
        parse_ulid(self.required(col)?)
    }

    fn text(&self, col: &'static str) -> Result<String, SqlError> {
        parse_text(self.required(col)?)
    }

    fn opt_text(&self, col: &str) -> Result<Option<String>, SqlError> {
        self.get(col).map(parse_text).transpose()
    }

    fn time(&self, col: &'static str) -> Result<Ms, SqlError> {
        parse_time(self.required(col)?)
    }

    fn opt_u32(&self, col: &str) -> Result<Option<u32>, SqlError> {
        self.get(col).map(parse_u32).transpose()
    }

    fn stay(&self) -> Result<StayRequest, SqlError> {
        let (start, end) = (self.time("check_in")?, self.time("check_out")?);
        if start >= end {
            return Err(SqlError::Parse("check_in must be before check_out".into()));
        }
        Ok(StayRequest {
            id: self.ulid("id")?,
            room_id: self.ulid("room_id")?,
            user_id: self.ulid("user_id")?,
            span: Span::new(start, end),
            guests: self.opt_u32("guests")?.unwrap_or(1),
        })
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let name = insert_table_name(insert)?;
    let (table, defaults) = known_table(&name)?;
    let rows = extract_insert_rows(insert)?;

    let columns: Vec<String> = if insert.columns.is_empty() {
        defaults.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if let Some(unknown) = columns
        .iter()
        .find(|c| !defaults.contains(&c.as_str()) && !(table == "bookings" && c.as_str() == "reservation_id"))
    {
        return Err(SqlError::UnknownColumn(table, unknown.clone()));
    }

    if table == "bookings" && rows.len() > 1 {
        let mut stays = Vec::with_capacity(rows.len());
        for (i, values) in rows.iter().enumerate() {
            let stay = Row::new(table, &columns, values)?
                .stay()
                .map_err(|e| SqlError::Parse(format!("row {i}: {e}")))?;
            stays.push(stay);
        }
        return Ok(Command::BatchInsertBookings(stays));
    }
    if rows.len() > 1 {
        return Err(SqlError::Unsupported(format!("multi-row INSERT into {table}")));
    }
    let row = Row::new(table, &columns, &rows[0])?;

    match table {
        "hotels" => Ok(Command::InsertHotel {
            id: row.ulid("id")?,
            name: row.text("name")?,
            location: row.text("location")?,
            description: row.opt_text("description")?,
            stars: row.get("stars").map(parse_u8).transpose()?,
        }),
        "rooms" => Ok(Command::InsertRoom {
            id: row.ulid("id")?,
            hotel_id: row.ulid("hotel_id")?,
            room_type: row.text("room_type")?,
            price_per_night: parse_i64(row.required("price_per_night")?)?,
            max_guests: parse_u32(row.required("max_guests")?)?,
            units: row.opt_u32("units")?.unwrap_or(1),
        }),
        "users" => Ok(Command::InsertUser {
            id: row.ulid("id")?,
            email: row.text("email")?,
            full_name: row.text("full_name")?,
            phone: row.opt_text("phone")?,
            role: row.get("role").map(parse_role).transpose()?.unwrap_or(Role::Guest),
        }),
        "closures" => Ok(Command::InsertClosure {
            id: row.ulid("id")?,
            target_id: row.ulid("target_id")?,
            start: row.time("start")?,
            end: row.time("end")?,
        }),
        "reservations" => Ok(Command::InsertReservation {
            stay: row.stay()?,
            expires_at: row.get("expires_at").map(parse_time).transpose()?,
        }),
        "bookings" if columns.iter().any(|c| c == "reservation_id") => Ok(Command::ConfirmReservation {
            booking_id: row.ulid("id")?,
            reservation_id: row.ulid("reservation_id")?,
        }),
        "bookings" => Ok(Command::InsertBooking(row.stay()?)),
        "notifications" => Ok(Command::InsertNotification {
            id: row.ulid("id")?,
            user_id: row.ulid("user_id")?,
            title: row.text("title")?,
            message: row.opt_text("message")?.unwrap_or_default(),
        }),
        _ => Err(SqlError::UnknownTable(table.to_string())),
    }
}

fn known_table(name: &str) -> Result<(&'static str, &'static [&'static str]), SqlError> {
    const TABLES: [&str; 7] = ["hotels", "rooms", "users", "closures", "reservations", "bookings", "notifications"];
    let table = TABLES
        .into_iter()
        .find(|t| *t == name)
        .ok_or_else(|| SqlError::UnknownTable(name.to_string()))?;
    let defaults = default_columns(table).ok_or_else(|| SqlError::UnknownTable(name.to_string()))?;
    Ok((table, defaults))
}

// ── UPDATE ────────────────────────────────────────────────────

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let name = table_factor_name(relation)?;
    let (table, _) = known_table(&name)?;
    let id = extract_where_id(selection)?;

    let mut sets = Vec::with_capacity(assignments.len());
    for a in assignments {
        let col = match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        sets.push((col, &a.value));
    }
    let unknown = |col: &str| SqlError::UnknownColumn(table, col.to_string());

    match table {
        "hotels" => {
            let mut patch = HotelPatch::default();
            for (col, value) in sets {
                match col.as_str() {
                    "name" => patch.name = Some(parse_text(value)?),
                    "location" => patch.location = Some(parse_text(value)?),
                    "description" => patch.description = Some(nullable(value, parse_text)?),
                    "stars" => patch.stars = Some(nullable(value, parse_u8)?),
                    other => return Err(unknown(other)),
                }
            }
            Ok(Command::UpdateHotel { id, patch })
        }
        "rooms" => {
            let mut patch = RoomPatch::default();
            for (col, value) in sets {
                match col.as_str() {
                    "room_type" => patch.room_type = Some(parse_text(value)?),
                    "price_per_night" => patch.price_per_night = Some(parse_i64(value)?),
                    "max_guests" => patch.max_guests = Some(parse_u32(value)?),
                    "units" => patch.units = Some(parse_u32(value)?),
                    "available" => patch.available = Some(parse_bool(value)?),
                    other => return Err(unknown(other)),
                }
            }
            Ok(Command::UpdateRoom { id, patch })
        }
        "users" => {
            let mut patch = UserPatch::default();
            for (col, value) in sets {
                match col.as_str() {
                    "email" => patch.email = Some(parse_text(value)?),
                    "full_name" => patch.full_name = Some(parse_text(value)?),
                    "phone" => patch.phone = Some(nullable(value, parse_text)?),
                    "role" => patch.role = Some(parse_role(value)?),
                    other => return Err(unknown(other)),
                }
            }
            Ok(Command::UpdateUser { id, patch })
        }
        "bookings" => match sets.as_slice() {
            [(col, value)] if col == "status" => {
                let text = parse_text(value)?;
                let status = text.parse().map_err(SqlError::Parse)?;
                Ok(Command::UpdateBookingStatus { id, status })
            }
            _ => Err(SqlError::Unsupported("bookings only allow SET status".into())),
        },
        "notifications" => match sets.as_slice() {
            [(col, value)] if col == "read" => Ok(Command::UpdateNotification {
                id,
                read: parse_bool(value)?,
            }),
            _ => Err(SqlError::Unsupported("notifications only allow SET read".into())),
        },
        other => Err(SqlError::Unsupported(format!("UPDATE {other}"))),
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "hotels" => Ok(Command::DeleteHotel { id }),
        "rooms" => Ok(Command::DeleteRoom { id }),
        "users" => Ok(Command::DeleteUser { id }),
        "closures" => Ok(Command::DeleteClosure { id }),
        "reservations" => Ok(Command::DeleteReservation { id }),
        "bookings" => Ok(Command::DeleteBooking { id }),
        "notifications" => Ok(Command::DeleteNotification { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

/// `col <op> value` terms of a WHERE clause joined by AND.
struct Filters<'a> {
    table: &'static str,
    terms: Vec<(String, &'a BinaryOperator, &'a Expr)>,
}

impl<'a> Filters<'a> {
    fn new(table: &'static str, selection: Option<&'a Expr>) -> Result<Self, SqlError> {
        let mut terms = Vec::new();
        if let Some(expr) = selection {
            collect_terms(expr, &mut terms)?;
        }
        Ok(Self { table, terms })
    }

    /// Reject columns the table cannot filter on.
    fn allow(&self, columns: &[&str]) -> Result<(), SqlError> {
        match self.terms.iter().find(|(c, _, _)| !columns.contains(&c.as_str())) {
            Some((c, _, _)) => Err(SqlError::UnknownColumn(self.table, c.clone())),
            None => Ok(()),
        }
    }

    fn find(&self, col: &str, op: BinaryOperator) -> Option<&'a Expr> {
        self.terms
            .iter()
            .find(|(c, o, _)| c == col && **o == op)
            .map(|(_, _, e)| *e)
    }

    fn eq_ulid(&self, col: &str) -> Result<Option<Ulid>, SqlError> {
        self.find(col, BinaryOperator::Eq).map(parse_ulid).transpose()
    }

    fn required_ulid(&self, col: &'static str) -> Result<Ulid, SqlError> {
        self.eq_ulid(col)?.ok_or(SqlError::MissingFilter(col))
    }

    /// `check_in >= x AND check_out <= y` window.
    fn window(&self) -> Result<(Ms, Ms), SqlError> {
        let start = self
            .find("check_in", BinaryOperator::GtEq)
            .ok_or(SqlError::MissingFilter("check_in"))?;
        let end = self
            .find("check_out", BinaryOperator::LtEq)
            .ok_or(SqlError::MissingFilter("check_out"))?;
        let (start, end) = (parse_time(start)?, parse_time(end)?);
        if start >= end {
            return Err(SqlError::Parse("check_in must be before check_out".into()));
        }
        Ok((start, end))
    }
}

fn collect_terms<'a>(
    expr: &'a Expr,
    out: &mut Vec<(String, &'a BinaryOperator, &'a Expr)>,
) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_terms(inner, out),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_terms(left, out)?;
            collect_terms(right, out)
        }
        Expr::BinaryOp { left, op, right } => {
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("filter {expr}")))?;
            out.push((col, op, right.as_ref()));
            Ok(())
        }
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let name = table_factor_name(&select.from[0].relation)?;
    let table: &'static str = match name.as_str() {
        "availability" => "availability",
        "available_rooms" => "available_rooms",
        "dashboard" => "dashboard",
        other => known_table(other)?.0,
    };
    let f = Filters::new(table, select.selection.as_ref())?;

    match table {
        "hotels" => {
            f.allow(&["id"])?;
            Ok(Command::SelectHotels { id: f.eq_ulid("id")? })
        }
        "rooms" => {
            f.allow(&["id", "hotel_id"])?;
            Ok(Command::SelectRooms {
                id: f.eq_ulid("id")?,
                hotel_id: f.eq_ulid("hotel_id")?,
            })
        }
        "users" => {
            f.allow(&["id"])?;
            Ok(Command::SelectUsers { id: f.eq_ulid("id")? })
        }
        "closures" => {
            f.allow(&["target_id"])?;
            Ok(Command::SelectClosures {
                target_id: f.required_ulid("target_id")?,
            })
        }
        "reservations" => {
            f.allow(&["room_id", "user_id"])?;
            Ok(Command::SelectReservations {
                room_id: f.eq_ulid("room_id")?,
                user_id: f.eq_ulid("user_id")?,
            })
        }
        "bookings" => {
            f.allow(&["id", "room_id", "hotel_id", "user_id", "status"])?;
            let filter = match f.terms.as_slice() {
                [] => BookingFilter::All,
                [(col, BinaryOperator::Eq, value)] => match col.as_str() {
                    "id" => BookingFilter::Id(parse_ulid(value)?),
                    "room_id" => BookingFilter::Room(parse_ulid(value)?),
                    "hotel_id" => BookingFilter::Hotel(parse_ulid(value)?),
                    "user_id" => BookingFilter::User(parse_ulid(value)?),
                    _ => BookingFilter::Status(parse_text(value)?.parse().map_err(SqlError::Parse)?),
                },
                _ => return Err(SqlError::Unsupported("bookings take a single equality filter".into())),
            };
            Ok(Command::SelectBookings(filter))
        }
        "notifications" => {
            f.allow(&["user_id"])?;
            Ok(Command::SelectNotifications {
                user_id: f.eq_ulid("user_id")?,
            })
        }
        "availability" => {
            f.allow(&["room_id", "check_in", "check_out", "min_nights"])?;
            let (start, end) = f.window()?;
            Ok(Command::SelectAvailability {
                room_id: f.required_ulid("room_id")?,
                start,
                end,
                min_nights: f.find("min_nights", BinaryOperator::Eq).map(parse_i64).transpose()?,
            })
        }
        "available_rooms" => {
            f.allow(&["hotel_id", "check_in", "check_out", "guests"])?;
            let (start, end) = f.window()?;
            Ok(Command::SelectAvailableRooms {
                hotel_id: f.required_ulid("hotel_id")?,
                start,
                end,
                guests: f.find("guests", BinaryOperator::Eq).map(parse_u32).transpose()?,
            })
        }
        _ => {
            f.allow(&["hotel_id"])?;
            Ok(Command::SelectDashboard {
                hotel_id: f.eq_ulid("hotel_id")?,
            })
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<&[Vec<Expr>], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) if !values.rows.is_empty() => Ok(&values.rows),
        SetExpr::Values(_) => Err(SqlError::Parse("empty VALUES".into())),
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("id") => parse_ulid(right),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

/// `NULL` clears an optional column in an UPDATE.
fn nullable<T>(
    expr: &Expr,
    parse: impl Fn(&Expr) -> Result<T, SqlError>,
) -> Result<Option<T>, SqlError> {
    if is_null(expr) { Ok(None) } else { parse(expr).map(Some) }
}

fn parse_text(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID {s}: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected ULID string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64(expr)?);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _) | Value::SingleQuotedString(s)) => s
            .trim()
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}"))),
        Some(value) => Err(SqlError::Parse(format!("expected number, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of range")))
}

fn parse_u8(expr: &Expr) -> Result<u8, SqlError> {
    let v = parse_i64(expr)?;
    u8::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of range")))
}

/// Epoch milliseconds, or a `'YYYY-MM-DD'` date at midnight UTC.
fn parse_time(expr: &Expr) -> Result<Ms, SqlError> {
    if let Some(Value::SingleQuotedString(s)) = extract_value(expr)
        && let Some(ms) = parse_day(s)
    {
        return Ok(ms);
    }
    parse_i64(expr).map_err(|_| SqlError::Parse(format!("expected date or epoch ms, got {expr}")))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        Some(value) => Err(SqlError::Parse(format!("expected bool, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_role(expr: &Expr) -> Result<Role, SqlError> {
    parse_text(expr)?.parse().map_err(SqlError::Parse)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(&'static str, String),
    WrongArity(&'static str, usize, usize),
    MissingColumn(&'static str, &'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(t, c) => write!(f, "{t}: unknown column {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(t, c) => write!(f, "{t}: missing value for {c}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
