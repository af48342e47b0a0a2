//! Template content for the init command.

/// Skeleton `flake.json`.
/// Contains {system} placeholders for substitution.
pub const FLAKE_JSON_TEMPLATE: &str = r##"{
  "description": "A flake for building Hello World",
  "inputs": {},
  "outputs": {
    "packages": {
      "{system}": {
        "hello": {
          "type": "derivation",
          "name": "hello",
          "system": "{system}",
          "builder": "/bin/sh",
          "args": [
            "-c",
            "mkdir -p \"$out/bin\" && printf '#!/bin/sh\\necho Hello, world!\\n' > \"$out/bin/hello\" && chmod +x \"$out/bin/hello\""
          ]
        }
      }
    },
    "defaultPackage": {
      "{system}": { "$self": "packages.{system}.hello" }
    },
    "apps": {
      "{system}": {
        "hello": {
          "type": "app",
          "program": { "$concat": [{ "$self": "packages.{system}.hello" }, "/bin/hello"] }
        }
      }
    }
  }
}
"##;
