use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_until, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, satisfy},
    combinator::{map_res, not, opt, recognize},
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};
use uuid::Uuid;

use crate::query::ListParams;

#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    Ingest { satellite_id: String, altitude: f64, velocity: f64, status: Option<String>, at: Option<String> },
    List { params: ListParams },
    Get { id: Uuid },
    Delete { id: Uuid },
    Help,
    Exit,
}

// --- BASIC PARSERS ---

fn parse_float(input: &str) -> IResult<&str, f64> {
    let (input, num_str) = recognize(tuple((
        opt(char('-')),
                                            digit1,
                                            opt(tuple((char('.'), digit1))),
    )))(input)?;
    match num_str.parse::<f64>() {
        Ok(n) => Ok((input, n)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float))),
    }
}

// Sign is kept so the server, not the shell, rejects negative paging
fn parse_i64(input: &str) -> IResult<&str, i64> {
    map_res(recognize(tuple((opt(char('-')), digit1))), |s: &str| s.parse::<i64>())(input)
}

fn parse_quoted_string(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    let (input, content) = take_until("\"")(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, content.to_string()))
}

/// A bare timestamp token; checked by the server, not here.
fn parse_timestamp(input: &str) -> IResult<&str, String> {
    let (input, _) = opt(char('\''))(input)?;
    let (input, ts) = take_while1(|c: char| !c.is_whitespace() && c != '\'')(input)?;
    let (input, _) = opt(char('\''))(input)?;
    Ok((input, ts.to_string()))
}

fn parse_uuid(input: &str) -> IResult<&str, Uuid> {
    let (input, uuid_str) = take_while(|c: char| c.is_ascii_hexdigit() || c == '-')(input)?;
    match Uuid::parse_str(uuid_str) {
        Ok(uuid) => Ok((input, uuid)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))),
    }
}

fn parse_quoted_uuid(input: &str) -> IResult<&str, Uuid> {
    delimited(opt(char('\'')), parse_uuid, opt(char('\'')))(input)
}

// --- HELPERS ---
fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where F: FnMut(&'a str) -> IResult<&'a str, O, E> {
    delimited(multispace0, inner, multispace0)
}

/// Case-insensitive keyword. `LISTSAT` is not `LIST` followed by `SAT`.
fn tag_ci(t: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| terminated(tag_no_case(t), not(satisfy(|c: char| c.is_alphanumeric() || c == '_')))(input)
}

// --- COMMAND PARSERS ---

fn parse_ingest(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("INGEST")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, satellite_id) = parse_quoted_string(input)?;

    let (input, altitude) = preceded(ws(tag_ci("ALT")), parse_float)(input)?;
    let (input, velocity) = preceded(ws(tag_ci("VEL")), parse_float)(input)?;

    let (input, status) = opt(preceded(ws(tag_ci("STATUS")), parse_quoted_string))(input)?;
    let (input, at) = opt(preceded(ws(tag_ci("AT")), parse_timestamp))(input)?;

    Ok((input, Command::Ingest { satellite_id, altitude, velocity, status, at }))
}

fn parse_list(input: &str) -> IResult<&str, Command> {
    let (input, _) = alt((tag_ci("LIST"), tag_ci("FIND")))(input)?;

    let (input, satellite_id) = opt(preceded(ws(tag_ci("SAT")), parse_quoted_string))(input)?;
    let (input, status) = opt(preceded(ws(tag_ci("STATUS")), parse_quoted_string))(input)?;
    let (input, start_time) = opt(preceded(ws(tag_ci("FROM")), parse_timestamp))(input)?;
    let (input, end_time) = opt(preceded(ws(tag_ci("TO")), parse_timestamp))(input)?;
    let (input, limit) = opt(preceded(ws(tag_ci("LIMIT")), parse_i64))(input)?;
    let (input, offset) = opt(preceded(ws(tag_ci("OFFSET")), parse_i64))(input)?;

    let params = ListParams { satellite_id, status, start_time, end_time, limit, offset };
    Ok((input, Command::List { params }))
}

fn parse_get(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("GET")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, id) = parse_quoted_uuid(input)?;
    Ok((input, Command::Get { id }))
}

fn parse_delete(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("DELETE")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, id) = parse_quoted_uuid(input)?;
    Ok((input, Command::Delete { id }))
}

fn parse_help(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("HELP")(input)?;
    Ok((input, Command::Help))
}

fn parse_exit(input: &str) -> IResult<&str, Command> {
    let (input, _) = alt((tag_ci("EXIT"), tag_ci("QUIT")))(input)?;
    Ok((input, Command::Exit))
}

pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let result = alt((
        parse_ingest,
        parse_list,
        parse_get,
        parse_delete,
        parse_help,
        parse_exit,
    ))(input);

    match result {
        Ok((remainder, cmd)) => {
            if !remainder.trim().is_empty() {
                return Err(format!("Unexpected tokens at end: '{}'", remainder));
            }
            Ok(cmd)
        },
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let context: String = e.input.chars().take(20).collect();
            let context = if context.len() < e.input.len() { format!("{}...", context) } else { context };
            Err(format!("Invalid syntax near: '{}'", context))
        },
        Err(nom::Err::Incomplete(_)) => Err("Incomplete command.".to_string()),
    }
}
