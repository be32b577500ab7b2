// [libs/domain/gather/src/discovery.rs]
/*!
 * =================================================================
 * APARATO: CONFIG DISCOVERY FORGE (V5.1 - BASE64 BOUNDED)
 * CLASIFICACIÓN: DOMAIN GENERATORS (ESTRATO L2)
 * RESPONSABILIDAD: CAZA DE CONFIGURACIÓN POR PROCESO Y CATÁLOGO FIJO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SIX-SOURCE HUNT: argumentos, descriptores abiertos, listas de
 *    paquete, /etc/<nombre> con alias, rutas estándar y unidad systemd
 *    (FragmentPath + EnvironmentFiles).
 * 2. HARD CAPS: 256 KB por archivo, 30 por proceso, 200 en total. El
 *    contenido viaja en base64 para sobrevivir cualquier codificación.
 * 3. FIXED CATALOG: los hechos de runtime por proceso provienen de un
 *    catálogo de comandos conocidos, jamás de una llamada LLM.
 * =================================================================
 */

/// Parámetros del script de descubrimiento de configuración.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDiscoveryOptions {
    /// Plazo por proceso individual, en segundos.
    pub per_process_timeout_secs: u32,
    /// Envuelve los comandos de catálogo en `sudo -n` (toggle por host).
    pub allow_sudo: bool,
}

impl Default for ConfigDiscoveryOptions {
    fn default() -> Self {
        Self { per_process_timeout_secs: 15, allow_sudo: false }
    }
}

/// Tope duro de bytes por archivo de configuración (256 KB).
pub const MAX_CONFIG_FILE_BYTES: u32 = 262_144;
/// Tope de archivos por proceso.
pub const MAX_FILES_PER_PROCESS: u32 = 30;
/// Tope global de archivos del documento.
pub const MAX_FILES_TOTAL: u32 = 200;

/**
 * Forja el programa de descubrimiento. Determinista dadas las opciones.
 *
 * Emite un documento `{"processes": [{process, pid, exe, configs:
 * [{path, size, content_base64}]}]}` acotado por los topes duros.
 */
pub fn generate_config_discovery_script(options: &ConfigDiscoveryOptions) -> String {
    let mut script = String::with_capacity(8 * 1024);

    script.push_str(&format!(
        "#!/bin/bash\n\
         # systemmap config discovery\n\
         export LC_ALL=C\n\
         export PATH=\"$PATH:/usr/sbin:/sbin:/usr/local/sbin\"\n\
         PER_PROCESS_TIMEOUT={timeout}\n\
         MAX_FILE_BYTES={max_bytes}\n\
         MAX_PER_PROCESS={max_per_process}\n\
         MAX_TOTAL={max_total}\n",
        timeout = options.per_process_timeout_secs,
        max_bytes = MAX_CONFIG_FILE_BYTES,
        max_per_process = MAX_FILES_PER_PROCESS,
        max_total = MAX_FILES_TOTAL,
    ));

    script.push_str(DISCOVERY_BODY);
    script
}

const DISCOVERY_BODY: &str = r##"
json_escape() {
  sed -e 's/\\/\\\\/g' -e 's/"/\\"/g' -e 's/\t/\\t/g' -e 's/\r//g' \
    | awk 'NR>1{printf "\\n"} {printf "%s", $0} END{printf ""}'
}
je() { printf '%s' "$1" | json_escape; }

CONFIG_EXTENSIONS='conf|cfg|ini|yaml|yml|toml|json|properties|xml'

# Alias de directorios /etc para nombres de proceso divergentes.
etc_alias() {
  case "$1" in
    postgres|postmaster) printf 'postgresql' ;;
    mysqld) printf 'mysql' ;;
    httpd) printf 'apache2' ;;
    apache2) printf 'httpd' ;;
    named) printf 'bind' ;;
    *) printf '%s' "$1" ;;
  esac
}

# Candidatos por proceso, una ruta por línea, sin duplicados.
candidate_paths() {
  local pid="$1" comm="$2" exe_path="$3" alias_name
  alias_name=$(etc_alias "$comm")
  {
    # (a) argumentos de línea de comandos con pinta de configuración
    tr '\0' '\n' < "/proc/$pid/cmdline" 2>/dev/null \
      | grep -E "\.(${CONFIG_EXTENSIONS})$" | grep '^/'
    # (b) descriptores abiertos filtrados por extensión
    for fd_link in /proc/$pid/fd/*; do
      readlink "$fd_link" 2>/dev/null
    done | grep -E "\.(${CONFIG_EXTENSIONS})$" | grep '^/'
    # (c) lista de archivos del paquete dueño del ejecutable
    if [ -n "$exe_path" ]; then
      if command -v dpkg >/dev/null 2>&1; then
        dpkg -S "$exe_path" 2>/dev/null | cut -d: -f1 | head -n 1 | while read -r package_name; do
          dpkg -L "$package_name" 2>/dev/null | grep '^/etc/' | grep -E "\.(${CONFIG_EXTENSIONS})$"
        done
      elif command -v rpm >/dev/null 2>&1; then
        rpm -qf "$exe_path" --qf '%{NAME}\n' 2>/dev/null | head -n 1 | while read -r package_name; do
          rpm -ql "$package_name" 2>/dev/null | grep '^/etc/' | grep -E "\.(${CONFIG_EXTENSIONS})$"
        done
      fi
    fi
    # (d) /etc/<nombre> y alias
    for etc_dir in "/etc/$comm" "/etc/$alias_name"; do
      [ -d "$etc_dir" ] && find "$etc_dir" -maxdepth 2 -type f -size -${MAX_FILE_BYTES}c 2>/dev/null \
        | grep -E "\.(${CONFIG_EXTENSIONS})$"
    done
    # (e) ubicaciones estándar
    for standard_path in "/etc/$comm.conf" "/etc/$alias_name.conf" \
        "/etc/default/$comm" "/usr/local/etc/$comm.conf"; do
      [ -f "$standard_path" ] && printf '%s\n' "$standard_path"
    done
    # (f) unidad systemd y EnvironmentFiles
    if command -v systemctl >/dev/null 2>&1; then
      systemctl show "$comm.service" -p FragmentPath,EnvironmentFiles 2>/dev/null \
        | sed -n 's/^[A-Za-z]*=\(\/[^ ]*\).*/\1/p'
    fi
  } | sort -u | head -n "${MAX_PER_PROCESS}"
}

TOTAL_EMITTED=0
first_process=1

printf '{"processes": ['

ps -eo pid=,comm= --sort=-pcpu 2>/dev/null | head -n 120 | while read -r pid comm; do
  # Los hilos del kernel no poseen configuración en disco.
  [ -e "/proc/$pid/exe" ] || continue
  case "$comm" in \[*\]|kworker*|ksoftirqd*|migration*) continue ;; esac
  [ "$TOTAL_EMITTED" -ge "$MAX_TOTAL" ] && break

  exe_path=$(readlink "/proc/$pid/exe" 2>/dev/null)

  [ "$first_process" = 1 ] || printf ','
  first_process=0
  printf '{"process":"%s","pid":%s,"exe":"%s","configs":[' \
    "$(je "$comm")" "$pid" "$(je "$exe_path")"

  first_file=1
  candidate_paths "$pid" "$comm" "$exe_path" | while read -r config_path; do
    [ -r "$config_path" ] || continue
    [ "$TOTAL_EMITTED" -ge "$MAX_TOTAL" ] && break
    file_size=$(stat -c %s "$config_path" 2>/dev/null || echo 0)
    [ "$file_size" -gt "$MAX_FILE_BYTES" ] && continue
    [ "$first_file" = 1 ] || printf ','
    first_file=0
    TOTAL_EMITTED=$((TOTAL_EMITTED + 1))
    printf '{"path":"%s","size":%s,"content_base64":"%s"}' \
      "$(je "$config_path")" "$file_size" \
      "$(base64 -w 0 "$config_path" 2>/dev/null)"
  done

  printf ']}'
done

printf ']}\n'
"##;

// ------------------------------------------------------------------
// CATÁLOGO FIJO DE COMANDOS DE DESCUBRIMIENTO
// ------------------------------------------------------------------

/// Comandos de hechos de runtime por proceso conocido. Sin LLM: el
/// catálogo es cerrado y auditable.
const KNOWN_DISCOVERY_COMMANDS: &[(&str, &str)] = &[
    ("nginx", "nginx -T 2>/dev/null | head -c 16384"),
    ("apache2", "apachectl -S 2>&1 | head -n 60"),
    ("httpd", "httpd -S 2>&1 | head -n 60"),
    ("haproxy", "haproxy -vv 2>&1 | head -n 30"),
    ("sshd", "sshd -T 2>/dev/null | head -n 120"),
    ("postgres", "postgres --version 2>/dev/null; ls /etc/postgresql 2>/dev/null"),
    ("mysqld", "mysqld --version 2>/dev/null; mysqladmin variables 2>/dev/null | head -n 60"),
    ("mariadbd", "mariadbd --version 2>/dev/null"),
    ("redis-server", "redis-cli INFO server 2>/dev/null | head -n 40"),
    ("mongod", "mongod --version 2>/dev/null | head -n 10"),
    ("dockerd", "docker info 2>/dev/null | head -n 60"),
    ("containerd", "containerd --version 2>/dev/null"),
    ("php-fpm", "php-fpm -tt 2>&1 | head -n 80"),
    ("named", "named -V 2>/dev/null | head -n 10"),
    ("rabbitmq-server", "rabbitmqctl status 2>/dev/null | head -n 60"),
    ("keepalived", "keepalived --version 2>&1 | head -n 10"),
];

/**
 * Resuelve el comando de descubrimiento del catálogo para un proceso.
 *
 * Con `allow_sudo` el comando se envuelve en `sudo -n sh -c '…'`; sin
 * el toggle se ejecuta sin privilegios y el host decide qué revela.
 */
pub fn discovery_command_for(process_name: &str, allow_sudo: bool) -> Option<String> {
    let normalized_name = process_name.trim().to_ascii_lowercase();

    KNOWN_DISCOVERY_COMMANDS
        .iter()
        .find(|(known_name, _)| *known_name == normalized_name)
        .map(|(_, command)| {
            if allow_sudo {
                format!("sudo -n sh -c '{}'", command.replace('\'', "'\\''"))
            } else {
                (*command).to_string()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_discovery_determinism() {
        let options = ConfigDiscoveryOptions::default();
        assert_eq!(
            generate_config_discovery_script(&options),
            generate_config_discovery_script(&options)
        );
    }

    #[test]
    fn certify_hard_caps_interpolated() {
        let script = generate_config_discovery_script(&ConfigDiscoveryOptions::default());
        assert!(script.contains("MAX_FILE_BYTES=262144"));
        assert!(script.contains("MAX_PER_PROCESS=30"));
        assert!(script.contains("MAX_TOTAL=200"));
        assert!(script.contains("base64 -w 0"));
    }

    #[test]
    fn certify_six_hunt_sources_present() {
        let script = generate_config_discovery_script(&ConfigDiscoveryOptions::default());
        assert!(script.contains("/cmdline"));
        assert!(script.contains("/fd/"));
        assert!(script.contains("dpkg -L"));
        assert!(script.contains("rpm -ql"));
        assert!(script.contains("etc_alias"));
        assert!(script.contains("FragmentPath,EnvironmentFiles"));
    }

    #[test]
    fn certify_catalog_lookup() {
        assert!(discovery_command_for("nginx", false).unwrap().starts_with("nginx -T"));
        assert!(discovery_command_for("NGINX", false).is_some());
        assert!(discovery_command_for("unknown-daemon", false).is_none());
    }

    #[test]
    fn certify_sudo_wrapping_toggle() {
        let unprivileged = discovery_command_for("sshd", false).unwrap();
        assert!(!unprivileged.contains("sudo"));

        let privileged = discovery_command_for("sshd", true).unwrap();
        assert!(privileged.starts_with("sudo -n sh -c '"));
    }

    #[test]
    fn certify_postgres_alias() {
        let script = generate_config_discovery_script(&ConfigDiscoveryOptions::default());
        assert!(script.contains("postgres|postmaster) printf 'postgresql'"));
    }
}
