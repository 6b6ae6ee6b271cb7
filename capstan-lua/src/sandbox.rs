//! Lua sandbox creation
//!
//! Pipeline definitions are data, not programs, so the sandbox that
//! evaluates them includes only basic Lua functionality (tables, strings,
//! math, coroutines) and no I/O capabilities or the ability to load
//! external code.
//!
//! # Security
//! This sandbox prevents:
//! - Network access
//! - File system access
//! - Process execution
//! - Loading external modules via require()

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib, Table};

/// Create a restricted Lua sandbox for evaluating pipeline definitions
///
/// # Example
/// ```no_run
/// use capstan_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
/// let source = r#"
///     return {
///         name = "coverage",
///         on = "workflow_call",
///         steps = { -- ... steps here ... }
///     }
/// "#;
/// let definition: mlua::Table = lua.load(source).eval()?;
/// let name: String = definition.get("name")?;
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    // Only allow: TABLE, STRING, MATH, COROUTINE
    // Explicitly exclude: IO, OS, PACKAGE, DEBUG
    let lua = unsafe {
        Lua::unsafe_new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE,
            LuaOptions::default(),
        )
    };

    // Remove dangerous globals
    lua.globals().set("require", mlua::Nil)?;
    lua.globals().set("dofile", mlua::Nil)?;
    lua.globals().set("loadfile", mlua::Nil)?;

    register_pipeline_helpers(&lua)?;

    Ok(lua)
}

/// Register the `pipeline` helper table
///
/// Helper functions for writing definitions. They are passthroughs that
/// exist so definitions read declaratively; the parser only sees tables.
fn register_pipeline_helpers(lua: &Lua) -> LuaResult<()> {
    let pipeline = lua.create_table()?;

    // pipeline.define(definition) - returns the definition table as-is
    let define_fn = lua.create_function(|_, definition: Table| Ok(definition))?;
    pipeline.set("define", define_fn)?;

    // pipeline.step(config) - returns the config table as-is
    let step_fn = lua.create_function(|_, config: Table| Ok(config))?;
    pipeline.set("step", step_fn)?;

    lua.globals().set("pipeline", pipeline)?;

    Ok(())
}
